//! # Error Types
//!
//! Errors local to one request are contained in that request's result; none
//! of these ever propagate into the shared message-listener loop.

use crate::config::ConfigError;
use crate::ids::TransactionId;
use crate::transaction::Response;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Malformed construction arguments or API misuse. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The transport failed its capability check.
    #[error("transport must provide a native post primitive")]
    NonNativeTransport,

    /// Application code used a reserved message type.
    #[error("message type {0:?} is reserved for internal use")]
    ReservedType(String),

    /// Message types must be non-empty strings.
    #[error("message type must not be empty")]
    EmptyType,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Failures of the underlying transport binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No async runtime to deliver on.
    #[error("no async runtime available for delivery")]
    NoRuntime,

    /// The message could not be encoded into the wire shape.
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("post failed: {0}")]
    PostFailed(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Encode(e.to_string())
    }
}

/// Raised by a request or response interceptor.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("interceptor failed: {message}")]
pub struct InterceptorError {
    pub message: String,
    pub data: Option<Value>,
}

impl InterceptorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Error raised by a server-side handler.
///
/// Routed to the server's error handler; the default one answers with a
/// failure response carrying [`HandlerError::to_payload`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HandlerError {
    /// Application-level failure with a payload for the client.
    #[error("handler failed: {0}")]
    Failed(Value),

    #[error("internal handler error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn failed(data: impl Into<Value>) -> Self {
        HandlerError::Failed(data.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HandlerError::Internal(message.into())
    }

    /// Payload sent back in a failure response.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            HandlerError::Failed(data) => data.clone(),
            HandlerError::Internal(message) => json!({ "message": message }),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Internal(e.to_string())
    }
}

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Operation attempted while closed; recoverable by reopening.
    #[error("the client is closed and needs to be reopened")]
    Closed,

    /// No matching response within the configured window.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: TransactionId, after: Duration },

    /// Every handshake attempt failed; `last` is the final attempt's cause.
    #[error("handshake failed after {attempts} attempts: {last}")]
    HandshakeExhausted { attempts: u32, last: Box<ClientError> },

    /// An interceptor returned a value that is not a well-formed transaction.
    #[error("interceptor broke the transaction contract: {value}")]
    InterceptorContract { value: Value },

    #[error(transparent)]
    Interceptor(#[from] InterceptorError),

    /// The server answered with a failure status.
    #[error("request {} rejected: {}", .0.id, .0.data)]
    Rejected(Response),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// The failure response, if the server rejected the request.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            ClientError::Rejected(response) => Some(response),
            _ => None,
        }
    }
}
