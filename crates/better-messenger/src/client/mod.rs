//! # Client
//!
//! Issues requests over a [`Port`] and correlates responses arriving on a
//! [`Transport`] by transaction id.
//!
//! ## Connection States
//!
//! ```text
//!            open()                connect()              handshake ok
//! Closed ───────────▶ NotConnected ─────────▶ Connecting ─────────────▶ Connected
//!   ▲                      ▲                      │
//!   │ close() (any state)  └──── retries spent ───┘
//! ```
//!
//! - `connect()` coalesces concurrent callers onto one handshake.
//! - `request()` connects first when needed.
//! - Every request settles exactly once: response, timeout, or close.

mod interceptor;
mod pending;

pub use interceptor::{Identity, RequestInterceptor, ResponseInterceptor};
pub use pending::TaskStats;

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError, UsageError};
use crate::ids::{IdGenerator, TransactionId};
use crate::transaction::{Request, Response, Transaction};
use crate::transport::{ListenerId, MessageEvent, MessageListener, Port, Transport};
use crate::{is_internal_type, HANDSHAKE_TYPE};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pending::{Settlement, TaskTable};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Connection state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
    Closed,
}

type Connector = Shared<BoxFuture<'static, Result<(), ClientError>>>;

struct Lifecycle {
    state: ConnectionState,
    /// Bumped on every `open()`; stale handshakes compare against it.
    epoch: u64,
    listener: Option<ListenerId>,
    connector: Option<Connector>,
}

/// Request/response client.
///
/// Cheap to clone; clones share connection state and pending tasks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Where requests are posted.
    target: Arc<dyn Port>,
    /// Where responses are received.
    endpoint: Arc<dyn Transport>,
    config: ClientConfig,
    request_interceptor: Arc<dyn RequestInterceptor>,
    response_interceptor: Arc<dyn ResponseInterceptor>,
    ids: Arc<IdGenerator>,
    tasks: TaskTable,
    lifecycle: Mutex<Lifecycle>,
}

impl Client {
    /// Create an open client with default interceptors.
    ///
    /// # Arguments
    ///
    /// * `target` - Port requests are posted to
    /// * `endpoint` - Transport responses arrive on
    /// * `config` - Timeouts, handshake policy and destination hint
    pub fn new(
        target: Arc<dyn Port>,
        endpoint: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, UsageError> {
        Self::builder(target, endpoint).config(config).build()
    }

    pub fn builder(target: Arc<dyn Port>, endpoint: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(target, endpoint)
    }

    /// Start listening for responses. No-op unless closed.
    pub fn open(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state != ConnectionState::Closed {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let listener: MessageListener = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(event);
            }
        });

        lifecycle.listener = Some(self.inner.endpoint.add_listener(listener));
        lifecycle.epoch += 1;
        lifecycle.state = ConnectionState::NotConnected;
        debug!(epoch = lifecycle.epoch, "Client opened");
    }

    /// Stop listening and reject every pending request with
    /// [`ClientError::Closed`]. No-op if already closed.
    pub fn close(&self) {
        let listener = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state == ConnectionState::Closed {
                return;
            }
            lifecycle.state = ConnectionState::Closed;
            lifecycle.connector = None;
            lifecycle.listener.take()
        };

        if let Some(id) = listener {
            self.inner.endpoint.remove_listener(id);
        }

        let abandoned = self.inner.tasks.abandon_all();
        debug!(abandoned = abandoned, "Client closed");
    }

    /// Perform the handshake, or join the one in flight.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let connector = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match (lifecycle.state, lifecycle.connector.clone()) {
                (ConnectionState::Closed, _) => return Err(ClientError::Closed),
                (ConnectionState::Connected, _) => return Ok(()),
                (ConnectionState::Connecting, Some(connector)) => connector,
                (ConnectionState::NotConnected | ConnectionState::Connecting, _) => {
                    // The handshake task blocks on this lock, so it sees `Connecting`.
                    let connector = self.inner.start_handshake(lifecycle.epoch)?;
                    lifecycle.state = ConnectionState::Connecting;
                    lifecycle.connector = Some(connector.clone());
                    connector
                }
            }
        };

        connector.await
    }

    /// Send a request and wait for its response.
    ///
    /// Resolves with the response on success status; a failure status
    /// yields [`ClientError::Rejected`].
    pub async fn request(
        &self,
        message_type: impl Into<String>,
        data: Value,
    ) -> Result<Response, ClientError> {
        let timeout = self.inner.config.timeout;
        self.request_with_timeout(message_type, data, timeout).await
    }

    /// [`request`](Self::request) with an explicit timeout.
    pub async fn request_with_timeout(
        &self,
        message_type: impl Into<String>,
        data: Value,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let epoch = {
            let lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state == ConnectionState::Closed {
                return Err(ClientError::Closed);
            }
            lifecycle.epoch
        };

        let message_type = message_type.into();
        if message_type.is_empty() {
            return Err(UsageError::EmptyType.into());
        }
        if is_internal_type(&message_type) {
            return Err(UsageError::ReservedType(message_type).into());
        }

        if self.state() != ConnectionState::Connected {
            self.connect().await?;
        }

        let request = Request::new(&self.inner.ids, message_type, data);
        self.inner.send(request, timeout, epoch).await
    }

    /// Drop the pending task for `id`; its caller observes
    /// [`ClientError::Closed`].
    pub fn remove_task(&self, id: TransactionId) -> bool {
        self.inner.tasks.remove(id)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    #[must_use]
    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.inner.tasks.contains(id)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.tasks.len()
    }

    #[must_use]
    pub fn stats(&self) -> &TaskStats {
        self.inner.tasks.stats()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ClientInner {
    fn start_handshake(self: &Arc<Self>, epoch: u64) -> Result<Connector, ClientError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        // Spawned so that dropping every caller cannot strand `Connecting`.
        let handle = runtime.spawn(Arc::clone(self).handshake(epoch));
        Ok(async move {
            handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Handshake task aborted");
                Err(ClientError::Closed)
            })
        }
        .boxed()
        .shared())
    }

    /// Retry the handshake request with linear back-off.
    ///
    /// All attempts reuse one request, so a late reply to an earlier attempt
    /// can satisfy a later one. Only the last failure is reported.
    async fn handshake(self: Arc<Self>, epoch: u64) -> Result<(), ClientError> {
        let policy = self.config.handshake.clone();
        let request = Request::new(&self.ids, HANDSHAKE_TYPE, Value::Null);
        let mut last = ClientError::Closed;

        for attempt in 0..policy.attempts {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if !self.is_connecting(epoch) {
                return Err(ClientError::Closed);
            }

            match self.send(request.clone(), policy.attempt_timeout, epoch).await {
                Ok(_) => {
                    self.finish_handshake(epoch, true);
                    debug!(attempt = attempt + 1, "Handshake succeeded");
                    return Ok(());
                }
                Err(e) if e.is_closed() && !self.is_connecting(epoch) => return Err(e),
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "Handshake attempt failed");
                    last = e;
                }
            }
        }

        self.finish_handshake(epoch, false);
        warn!(attempts = policy.attempts, error = %last, "Handshake failed");
        Err(ClientError::HandshakeExhausted {
            attempts: policy.attempts,
            last: Box::new(last),
        })
    }

    fn is_connecting(&self, epoch: u64) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.epoch == epoch && lifecycle.state == ConnectionState::Connecting
    }

    fn finish_handshake(&self, epoch: u64, connected: bool) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.epoch != epoch || lifecycle.state != ConnectionState::Connecting {
            return;
        }
        if connected {
            lifecycle.state = ConnectionState::Connected;
        } else {
            lifecycle.state = ConnectionState::NotConnected;
            lifecycle.connector = None;
        }
    }

    /// Post `request` and wait up to `timeout` for its settlement.
    ///
    /// `epoch` is the lifecycle the caller started in. A close or reopen
    /// since then rejects the request before anything is posted.
    async fn send(&self, request: Request, timeout: Duration, epoch: u64) -> Settlement {
        let request = if request.is_internal() {
            request
        } else {
            self.intercept_request(request).await?
        };

        let id = request.id;
        let message = Transaction::from(request.clone())
            .to_message()
            .map_err(TransportError::from)?;

        // Registered under the lifecycle lock: `close` either sees this task
        // in `abandon_all` or we see `Closed` here.
        let rx = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.epoch != epoch || lifecycle.state == ConnectionState::Closed {
                debug!(id = %id, "Client closed before request was posted");
                return Err(ClientError::Closed);
            }
            self.tasks.register(request)
        };
        if let Err(e) = self.target.post_message(message, &self.config.target_origin) {
            self.tasks.remove(id);
            warn!(id = %id, error = %e, "Failed to post request");
            return Err(e.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(settlement)) => settlement,
            // Task dropped without settlement (explicit removal).
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.tasks.expire(id);
                Err(ClientError::Timeout { id, after: timeout })
            }
        }
    }

    async fn intercept_request(&self, request: Request) -> Result<Request, ClientError> {
        let intercepted =
            RequestInterceptor::intercept(self.request_interceptor.as_ref(), request).await?;
        if !intercepted.is_well_formed() || intercepted.is_internal() {
            warn!("The return value of the request interceptor must be a valid request");
            return Err(ClientError::InterceptorContract {
                value: Transaction::from(intercepted)
                    .to_message()
                    .unwrap_or_default(),
            });
        }
        Ok(intercepted)
    }

    /// Listener entry point for every inbound message.
    fn on_message(self: Arc<Self>, event: MessageEvent) {
        let Some(Transaction::Response(response)) = Transaction::classify(&event.data) else {
            return;
        };

        if !self.tasks.contains(response.id) {
            self.tasks.record_discarded(response.id);
            return;
        }

        if response.is_internal() {
            let id = response.id;
            self.tasks.settle(id, settlement_of(response));
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { self.receive(response).await });
            }
            Err(_) => {
                warn!(id = %response.id, "No async runtime, response dropped");
            }
        }
    }

    /// Run the response interceptor and settle the matching task.
    async fn receive(self: Arc<Self>, response: Response) {
        let id = response.id;
        let intercepted =
            ResponseInterceptor::intercept(self.response_interceptor.as_ref(), response).await;
        let result = match intercepted {
            Err(e) => Err(ClientError::Interceptor(e)),
            Ok(intercepted) if !intercepted.is_well_formed() || intercepted.is_internal() => {
                warn!(
                    id = %id,
                    "The return value of the response interceptor must be a valid response"
                );
                Err(ClientError::InterceptorContract {
                    value: Transaction::from(intercepted)
                        .to_message()
                        .unwrap_or_default(),
                })
            }
            Ok(intercepted) => settlement_of(intercepted),
        };
        self.tasks.settle(id, result);
    }
}

fn settlement_of(response: Response) -> Settlement {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Rejected(response))
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(id) = self.lifecycle.get_mut().listener.take() {
            self.endpoint.remove_listener(id);
        }
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    target: Arc<dyn Port>,
    endpoint: Arc<dyn Transport>,
    config: ClientConfig,
    request_interceptor: Arc<dyn RequestInterceptor>,
    response_interceptor: Arc<dyn ResponseInterceptor>,
    ids: Option<Arc<IdGenerator>>,
}

impl ClientBuilder {
    pub fn new(target: Arc<dyn Port>, endpoint: Arc<dyn Transport>) -> Self {
        Self {
            target,
            endpoint,
            config: ClientConfig::default(),
            request_interceptor: Arc::new(Identity),
            response_interceptor: Arc::new(Identity),
            ids: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptor = Arc::new(interceptor);
        self
    }

    #[must_use]
    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptor = Arc::new(interceptor);
        self
    }

    /// Draw ids from `ids` instead of the process-wide generator.
    #[must_use]
    pub fn id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate and build an open client.
    pub fn build(self) -> Result<Client, UsageError> {
        if !self.target.is_native() {
            return Err(UsageError::NonNativeTransport);
        }
        self.config.validate()?;

        let client = Client {
            inner: Arc::new(ClientInner {
                target: self.target,
                endpoint: self.endpoint,
                config: self.config,
                request_interceptor: self.request_interceptor,
                response_interceptor: self.response_interceptor,
                ids: self.ids.unwrap_or_else(IdGenerator::shared),
                tasks: TaskTable::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Closed,
                    epoch: 0,
                    listener: None,
                    connector: None,
                }),
            }),
        };
        client.open();
        Ok(client)
    }
}
