//! # Server
//!
//! Listens on a [`Transport`] and dispatches each incoming request through
//! the handlers registered for its type.
//!
//! ## Dispatch
//!
//! ```text
//! message ─▶ classify ─▶ Request? ─▶ snapshot matching handlers
//!                                           │
//!                   registration order      ▼
//!        handler 1 ── next ──▶ handler 2 ── next ──▶ ...
//!            │                     │
//!            └──── Err ────────────┴──▶ error handler
//! ```
//!
//! - Explicit-type handlers match their type only.
//! - Wildcard handlers match every application type but never the
//!   internal handshake.
//! - A built-in handler answers the handshake, so clients connect without
//!   any application setup.

mod chain;
mod handler;

pub use chain::{ChainState, DispatchReport, Next};
pub use handler::{ErrorHandler, HandlerId, MessageFilter, ReplyWithFailure, RequestHandler};

use crate::config::ServerConfig;
use crate::error::UsageError;
use crate::responder::Responder;
use crate::transaction::Transaction;
use crate::transport::{ListenerId, MessageEvent, MessageListener, Transport};
use crate::HANDSHAKE_TYPE;
use handler::{Entry, HandshakeHandler};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Whether a [`Server`] is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Open,
    Closed,
}

/// Request dispatcher.
///
/// Cheap to clone; clones share the handler registry and listener.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    endpoint: Arc<dyn Transport>,
    config: ServerConfig,
    error_handler: Arc<dyn ErrorHandler>,
    handlers: RwLock<Vec<Entry>>,
    next_handler_id: AtomicU64,
    /// Present while open.
    listener: Mutex<Option<ListenerId>>,
}

impl Server {
    /// Create an open server with the default error handler.
    pub fn new(endpoint: Arc<dyn Transport>, config: ServerConfig) -> Result<Self, UsageError> {
        Self::builder(endpoint).config(config).build()
    }

    pub fn builder(endpoint: Arc<dyn Transport>) -> ServerBuilder {
        ServerBuilder::new(endpoint)
    }

    /// Start listening. No-op if already open.
    pub fn open(&self) {
        let mut listener = self.inner.listener.lock();
        if listener.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let callback: MessageListener = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(event);
            }
        });
        *listener = Some(self.inner.endpoint.add_listener(callback));
        debug!("Server opened");
    }

    /// Stop listening. Chains already running finish on their own.
    pub fn close(&self) {
        let Some(id) = self.inner.listener.lock().take() else {
            return;
        };
        self.inner.endpoint.remove_listener(id);
        debug!("Server closed");
    }

    #[must_use]
    pub fn state(&self) -> ServerState {
        if self.inner.listener.lock().is_some() {
            ServerState::Open
        } else {
            ServerState::Closed
        }
    }

    /// Register `handler` for requests of `message_type`.
    pub fn listen(
        &self,
        message_type: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> HandlerId {
        self.inner.register(MessageFilter::Type(message_type.into()), Arc::new(handler), false)
    }

    /// Register `handler` for every application request type.
    pub fn listen_any(&self, handler: impl RequestHandler + 'static) -> HandlerId {
        self.inner.register(MessageFilter::Any, Arc::new(handler), false)
    }

    /// Remove every handler registered for exactly `message_type`.
    ///
    /// Returns the number removed. The built-in handshake handler stays.
    pub fn cancel(&self, message_type: &str) -> usize {
        self.inner.unregister(|entry| {
            matches!(&entry.filter, MessageFilter::Type(t) if t == message_type)
        })
    }

    /// Remove every wildcard handler.
    pub fn cancel_any(&self) -> usize {
        self.inner.unregister(|entry| entry.filter == MessageFilter::Any)
    }

    /// Remove one handler by identity.
    pub fn cancel_handler(&self, id: HandlerId) -> bool {
        self.inner.unregister(|entry| entry.id == id) > 0
    }

    /// Number of application handlers registered.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .iter()
            .filter(|entry| !entry.internal)
            .count()
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl ServerInner {
    fn register(
        &self,
        filter: MessageFilter,
        handler: Arc<dyn RequestHandler>,
        internal: bool,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        debug!(handler = %id, filter = ?filter, "Handler registered");
        self.handlers.write().push(Entry {
            id,
            filter,
            handler,
            internal,
        });
        id
    }

    fn unregister(&self, matches: impl Fn(&Entry) -> bool) -> usize {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|entry| entry.internal || !matches(entry));
        let removed = before - handlers.len();
        if removed > 0 {
            debug!(removed = removed, "Handlers cancelled");
        }
        removed
    }

    /// Listener entry point for every inbound message.
    fn on_message(&self, event: MessageEvent) {
        let Some(Transaction::Request(request)) = Transaction::classify(&event.data) else {
            return;
        };

        // Later registry changes do not affect this dispatch.
        let matched: Vec<Arc<dyn RequestHandler>> = self
            .handlers
            .read()
            .iter()
            .filter(|entry| entry.filter.matches(&request.message_type))
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        let responder = Responder::new(request.clone(), &event, self.config.reply_origin.clone());
        let error_handler = Arc::clone(&self.error_handler);

        let Ok(handle) = Handle::try_current() else {
            warn!(id = %request.id, "No async runtime, request dropped");
            return;
        };
        handle.spawn(async move {
            let report = chain::dispatch(request, responder, matched, error_handler).await;
            debug!(
                id = %report.request_id,
                state = ?report.state,
                matched = report.handlers_matched,
                run = report.handlers_run,
                responded = report.responded,
                "Dispatch finished"
            );
        });
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.get_mut().take() {
            self.endpoint.remove_listener(id);
        }
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    endpoint: Arc<dyn Transport>,
    config: ServerConfig,
    error_handler: Arc<dyn ErrorHandler>,
}

impl ServerBuilder {
    pub fn new(endpoint: Arc<dyn Transport>) -> Self {
        Self {
            endpoint,
            config: ServerConfig::default(),
            error_handler: Arc::new(ReplyWithFailure),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default error handler.
    #[must_use]
    pub fn error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(error_handler);
        self
    }

    /// Validate and build an open server with the handshake handler
    /// registered.
    pub fn build(self) -> Result<Server, UsageError> {
        if !self.endpoint.is_native() {
            return Err(UsageError::NonNativeTransport);
        }
        self.config.validate()?;

        let server = Server {
            inner: Arc::new(ServerInner {
                endpoint: self.endpoint,
                config: self.config,
                error_handler: self.error_handler,
                handlers: RwLock::new(Vec::new()),
                next_handler_id: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        };
        server.inner.register(
            MessageFilter::Type(HANDSHAKE_TYPE.to_string()),
            Arc::new(HandshakeHandler),
            true,
        );
        server.open();
        Ok(server)
    }
}
