//! # In-Memory Transport
//!
//! Window-like endpoints living in one process.
//!
//! ```text
//! ┌─────────────────┐  parent_to_child.post_message()  ┌─────────────────┐
//! │ MemoryWindow    │ ───────────────────────────────▶ │ MemoryWindow    │
//! │ "https://app"   │                                  │ "https://frame" │
//! │  (client side)  │ ◀─────────────────────────────── │  (server side)  │
//! └─────────────────┘      event.source.post_message() └─────────────────┘
//! ```
//!
//! - Posting through a [`WindowProxy`] delivers to the target window's
//!   listeners and attaches a reply port back to the sender.
//! - Posting directly on a [`MemoryWindow`] delivers to its own listeners with
//!   no reply port.
//! - A target origin other than `"*"` must equal the receiving window's origin
//!   or the message is silently dropped.
//! - Each post is delivered from its own spawned task, so posts are
//!   fire-and-forget and unordered.

use crate::error::TransportError;
use crate::transport::{ListenerId, MessageEvent, MessageListener, Port, Transport};
use crate::ANY_ORIGIN;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::debug;

/// A window-like endpoint with an origin and a set of message listeners.
pub struct MemoryWindow {
    /// Origin this window presents to receivers.
    origin: String,

    /// Whether the post primitive counts as platform-provided.
    native: bool,

    /// Registered listeners, in registration order.
    listeners: RwLock<Vec<(ListenerId, MessageListener)>>,

    next_listener: AtomicU64,

    /// Messages handed to listeners so far.
    delivered: AtomicU64,

    /// Messages dropped by the origin check.
    dropped: AtomicU64,

    this: Weak<MemoryWindow>,
}

impl MemoryWindow {
    /// Create a window with the given origin.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        Self::build(origin.into(), true)
    }

    /// Create a window whose post primitive is an application override.
    ///
    /// Engine constructors reject it.
    #[must_use]
    pub fn overridden(origin: impl Into<String>) -> Arc<Self> {
        Self::build(origin.into(), false)
    }

    fn build(origin: String, native: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            origin,
            native,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Origin of this window.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// A port that posts into this window on behalf of `sender`.
    #[must_use]
    pub fn proxy_for(self: &Arc<Self>, sender: &Arc<MemoryWindow>) -> Arc<WindowProxy> {
        Arc::new(WindowProxy {
            target: Arc::clone(self),
            sender: Arc::clone(sender),
        })
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of messages delivered to this window's listeners.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of messages dropped because the target origin did not match.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn accepts(&self, target_origin: &str) -> bool {
        target_origin == ANY_ORIGIN || target_origin == self.origin
    }

    /// Queue `event` for delivery to the current listeners.
    fn enqueue(&self, event: MessageEvent, target_origin: &str) -> Result<(), TransportError> {
        if !self.accepts(target_origin) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                origin = %self.origin,
                target_origin = target_origin,
                "Message dropped (target origin mismatch)"
            );
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let Some(window) = self.this.upgrade() else {
            return Err(TransportError::PostFailed("window dropped".into()));
        };

        handle.spawn(async move {
            window.deliver(event);
        });
        Ok(())
    }

    fn deliver(&self, event: MessageEvent) {
        // Snapshot so listeners may (un)register from inside a callback.
        let listeners: Vec<MessageListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        self.delivered.fetch_add(1, Ordering::Relaxed);
        debug!(
            origin = %self.origin,
            from = %event.origin,
            listeners = listeners.len(),
            "Message delivered"
        );

        for listener in listeners {
            listener(event.clone());
        }
    }
}

impl Port for MemoryWindow {
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), TransportError> {
        let event = MessageEvent::new(message, self.origin.clone(), None);
        self.enqueue(event, target_origin)
    }

    fn is_native(&self) -> bool {
        self.native
    }
}

impl Transport for MemoryWindow {
    fn add_listener(&self, listener: MessageListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        debug!(origin = %self.origin, listener = id.0, "Listener added");
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(origin = %self.origin, listener = id.0, "Listener removed");
        }
        removed
    }
}

/// Posts into a target window on behalf of a sender window.
///
/// Receivers get a reply port pointing back at the sender.
pub struct WindowProxy {
    target: Arc<MemoryWindow>,
    sender: Arc<MemoryWindow>,
}

impl WindowProxy {
    /// The window messages are posted into.
    #[must_use]
    pub fn target(&self) -> &Arc<MemoryWindow> {
        &self.target
    }

    /// The window messages are posted from.
    #[must_use]
    pub fn sender(&self) -> &Arc<MemoryWindow> {
        &self.sender
    }
}

impl Port for WindowProxy {
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), TransportError> {
        let reply: Arc<dyn Port> = self.sender.proxy_for(&self.target);
        let event = MessageEvent::new(message, self.sender.origin.clone(), Some(reply));
        self.target.enqueue(event, target_origin)
    }

    fn is_native(&self) -> bool {
        self.target.native
    }
}
