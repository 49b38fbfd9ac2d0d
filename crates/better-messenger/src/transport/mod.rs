//! # Transport Capability
//!
//! The engine needs only a fire-and-forget `post` and a way to subscribe to
//! inbound messages. Delivery is best-effort and unordered; nothing here
//! correlates or acknowledges messages.
//!
//! A concrete binding lives outside the engine. [`memory`] provides an
//! in-process binding with window-like semantics for tests and demos.

pub mod memory;

use crate::error::TransportError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Something a message can be posted to.
pub trait Port: Send + Sync {
    /// Post `message` to the peer behind this port.
    ///
    /// `target_origin` narrows acceptable destinations; `"*"` accepts any.
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), TransportError>;

    /// Whether the post primitive is the platform's own rather than an
    /// application-provided stand-in.
    fn is_native(&self) -> bool {
        true
    }
}

/// An endpoint that can also be listened on.
pub trait Transport: Port {
    /// Subscribe to inbound messages.
    fn add_listener(&self, listener: MessageListener) -> ListenerId;

    /// Unsubscribe. Returns false if `id` was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Callback invoked once per inbound message.
pub type MessageListener = Arc<dyn Fn(MessageEvent) + Send + Sync>;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One inbound message.
#[derive(Clone)]
pub struct MessageEvent {
    /// Raw message payload, not yet classified.
    pub data: Value,
    /// Origin of the sender.
    pub origin: String,
    /// Where replies to this message's sender go, if anywhere.
    pub source: Option<Arc<dyn Port>>,
}

impl MessageEvent {
    pub fn new(data: Value, origin: impl Into<String>, source: Option<Arc<dyn Port>>) -> Self {
        Self {
            data,
            origin: origin.into(),
            source,
        }
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("data", &self.data)
            .field("origin", &self.origin)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
