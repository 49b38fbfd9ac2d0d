//! Handler and error-handler seams of the server.

use super::chain::Next;
use crate::error::HandlerError;
use crate::is_internal_type;
use crate::responder::Responder;
use crate::transaction::Request;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// One step in a dispatch chain.
///
/// A handler may answer through the [`Responder`], pass control on with
/// [`Next::run`], or both. Returning without calling `next` ends the chain.
/// An `Err` is routed to the server's [`ErrorHandler`].
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        request: Request,
        responder: Responder,
        next: Next,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Request, Responder, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: Request,
        responder: Responder,
        next: Next,
    ) -> Result<(), HandlerError> {
        (self)(request, responder, next).await
    }
}

/// Receives every error raised inside a dispatch chain.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &HandlerError, request: &Request, responder: &Responder);
}

impl<F> ErrorHandler for F
where
    F: Fn(&HandlerError, &Request, &Responder) + Send + Sync,
{
    fn handle_error(&self, error: &HandlerError, request: &Request, responder: &Responder) {
        (self)(error, request, responder)
    }
}

/// Default error handler: answers with a failure response carrying
/// [`HandlerError::to_payload`], unless the request was already answered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyWithFailure;

impl ErrorHandler for ReplyWithFailure {
    fn handle_error(&self, error: &HandlerError, request: &Request, responder: &Responder) {
        if responder.is_sent() {
            debug!(id = %request.id, "Error after response was sent, not replying");
            return;
        }
        responder.reject(error.to_payload());
    }
}

/// Answers the reserved handshake type so clients can connect.
pub(crate) struct HandshakeHandler;

#[async_trait]
impl RequestHandler for HandshakeHandler {
    async fn handle(
        &self,
        _request: Request,
        responder: Responder,
        _next: Next,
    ) -> Result<(), HandlerError> {
        responder.resolve(serde_json::Value::Null);
        Ok(())
    }
}

/// Identity of a registered handler, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Which requests a handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageFilter {
    /// Exactly one message type.
    Type(String),
    /// Every application type. Never matches internal types.
    Any,
}

impl MessageFilter {
    #[must_use]
    pub fn matches(&self, message_type: &str) -> bool {
        match self {
            MessageFilter::Type(registered) => registered == message_type,
            MessageFilter::Any => !is_internal_type(message_type),
        }
    }
}

/// Registry entry.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: HandlerId,
    pub(crate) filter: MessageFilter,
    pub(crate) handler: Arc<dyn RequestHandler>,
    /// Built-in entries survive `cancel`.
    pub(crate) internal: bool,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("internal", &self.internal)
            .finish()
    }
}
