//! Responder: one-shot reply handle for one incoming request.
//!
//! Every handler in a dispatch chain and the error handler share the same
//! responder, so "has this request been answered" is a single flag. At most
//! one response is ever posted per request.

use crate::error::TransportError;
use crate::ids::TransactionId;
use crate::transaction::{Request, Response, Status, Transaction};
use crate::transport::{MessageEvent, Port};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reply handle bound to one incoming request and its sender.
#[derive(Clone)]
pub struct Responder {
    inner: Arc<ResponderInner>,
}

struct ResponderInner {
    /// The request being answered.
    request: Request,

    /// Origin of the request's sender.
    origin: String,

    /// Reply port of the sender, if the transport provided one.
    reply_to: Option<Arc<dyn Port>>,

    /// Destination hint for the reply.
    reply_origin: String,

    sent: AtomicBool,
}

impl Responder {
    /// Bind `request` to the event it arrived with.
    pub fn new(request: Request, event: &MessageEvent, reply_origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ResponderInner {
                request,
                origin: event.origin.clone(),
                reply_to: event.source.clone(),
                reply_origin: reply_origin.into(),
                sent: AtomicBool::new(false),
            }),
        }
    }

    /// Answer the request.
    ///
    /// Returns true if a response was posted. A second call is a no-op with a
    /// warning; without a reply port the call is a silent no-op.
    pub fn respond(&self, is_success: bool, data: Value) -> bool {
        let id = self.inner.request.id;

        if self.is_sent() {
            warn!(id = %id, "The request has already been answered");
            return false;
        }

        let Some(port) = self.inner.reply_to.as_ref() else {
            debug!(id = %id, "No reply target for request, response skipped");
            return false;
        };

        // Claim the single send before posting.
        if self
            .inner
            .sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(id = %id, "The request has already been answered");
            return false;
        }

        let status = Status::from_success(is_success);
        let response = Response::answering(&self.inner.request, status, data);

        match post(port.as_ref(), response, &self.inner.reply_origin) {
            Ok(()) => {
                debug!(
                    id = %id,
                    message_type = %self.inner.request.message_type,
                    status = ?status,
                    "Response sent"
                );
                true
            }
            Err(e) => {
                // Nothing left the endpoint; allow another attempt.
                self.inner.sent.store(false, Ordering::Release);
                warn!(id = %id, error = %e, "Failed to post response");
                false
            }
        }
    }

    /// Answer with a success response.
    pub fn resolve(&self, data: Value) -> bool {
        self.respond(true, data)
    }

    /// Answer with a failure response.
    pub fn reject(&self, data: Value) -> bool {
        self.respond(false, data)
    }

    /// Whether a response has been posted.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.inner.sent.load(Ordering::Acquire)
    }

    /// Whether the originating event carried a reply port.
    #[must_use]
    pub fn can_reply(&self) -> bool {
        self.inner.reply_to.is_some()
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    #[must_use]
    pub fn request_id(&self) -> TransactionId {
        self.inner.request.id
    }

    /// Origin of the request's sender.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }
}

fn post(port: &dyn Port, response: Response, target_origin: &str) -> Result<(), TransportError> {
    let message = Transaction::from(response).to_message()?;
    port.post_message(message, target_origin)
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("request_id", &self.inner.request.id)
            .field("can_reply", &self.can_reply())
            .field("sent", &self.is_sent())
            .finish()
    }
}
