//! # better-messenger - Request/Response RPC over Message Posting
//!
//! Turns a fire-and-forget, unordered, at-most-once message transport into a
//! request/response protocol with connection lifecycle, timeouts, retries and
//! per-message-type handling on the receiving side.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   Request (kind=request, id)   ┌──────────────┐
//! │    Client    │ ─────────────────────────────▶ │    Server    │
//! │              │                                │  handler 1   │
//! │ pending-task │                                │     next()   │
//! │    table     │   Response (same id, status)   │  handler 2   │
//! │              │ ◀───────────────────────────── │  Responder   │
//! └──────────────┘                                └──────────────┘
//! ```
//!
//! - The client correlates responses purely by transaction id.
//! - A reserved handshake exchange confirms the server is reachable before
//!   application requests are sent.
//! - The server walks matched handlers in registration order through an
//!   explicit `next()` continuation; errors go to a single error handler.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod responder;
pub mod server;
pub mod transaction;
pub mod transport;

// Re-export main types
pub use client::{
    Client, ClientBuilder, ConnectionState, RequestInterceptor, ResponseInterceptor, TaskStats,
};
pub use config::{ClientConfig, ConfigError, HandshakeConfig, ServerConfig};
pub use error::{ClientError, HandlerError, InterceptorError, TransportError, UsageError};
pub use ids::{IdGenerator, TransactionId};
pub use responder::Responder;
pub use server::{
    ChainState, DispatchReport, ErrorHandler, HandlerId, MessageFilter, Next, ReplyWithFailure,
    RequestHandler, Server, ServerBuilder, ServerState,
};
pub use transaction::{Request, Response, Status, Transaction};
pub use transport::memory::{MemoryWindow, WindowProxy};
pub use transport::{ListenerId, MessageEvent, MessageListener, Port, Transport};

/// Reserved message type of the internal handshake exchange.
pub const HANDSHAKE_TYPE: &str = "__HAND_SHAKE__";

/// Origin hint accepting any destination.
pub const ANY_ORIGIN: &str = "*";

/// Whether a message type is reserved for protocol-internal traffic.
///
/// Internal types bypass interceptors and are never matched by wildcard
/// handlers.
#[must_use]
pub fn is_internal_type(message_type: &str) -> bool {
    message_type == HANDSHAKE_TYPE
}
