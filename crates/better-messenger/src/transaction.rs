//! # Transactions
//!
//! The two message shapes that cross the transport, as one tagged union.
//!
//! ## Wire Shape
//!
//! ```text
//! { "kind": "request" | "response",
//!   "id":   <integer>,
//!   "type": <string>,
//!   "data": <any>,
//!   "status": "success" | "failure" }   // responses only
//! ```
//!
//! [`Transaction::classify`] is the only way a raw transport message enters
//! the engine. Anything that does not parse as one of the two shapes is
//! foreign traffic on a shared transport and is ignored by callers.

use crate::ids::{IdGenerator, TransactionId};
use crate::is_internal_type;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome carried by a [`Response`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Failure,
}

impl Status {
    /// Map a success flag to a status.
    #[must_use]
    pub fn from_success(is_success: bool) -> Self {
        if is_success {
            Status::Success
        } else {
            Status::Failure
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed by the response.
    pub id: TransactionId,
    /// Semantic purpose of the message.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Application payload, opaque to the engine.
    #[serde(default)]
    pub data: Value,
}

impl Request {
    /// Build a request with a fresh id from `ids`.
    pub fn new(ids: &IdGenerator, message_type: impl Into<String>, data: Value) -> Self {
        Self::with_id(ids.next_id(), message_type, data)
    }

    /// Build a request keeping an existing id.
    ///
    /// Used when reconstructing a request that arrived over the transport.
    pub fn with_id(id: TransactionId, message_type: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            data,
        }
    }

    /// Whether this request belongs to protocol-internal traffic.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        is_internal_type(&self.message_type)
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.message_type.is_empty()
    }
}

/// A response answering one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered.
    pub id: TransactionId,
    /// Type of the request being answered.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Application payload, opaque to the engine.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub status: Status,
}

impl Response {
    pub fn new(
        id: TransactionId,
        message_type: impl Into<String>,
        data: Value,
        status: Status,
    ) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            data,
            status,
        }
    }

    /// Build the response to `request`, sharing its id and type.
    #[must_use]
    pub fn answering(request: &Request, status: Status, data: Value) -> Self {
        Self::new(request.id, request.message_type.clone(), data, status)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn is_internal(&self) -> bool {
        is_internal_type(&self.message_type)
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.message_type.is_empty()
    }
}

/// Any message the engine puts on, or accepts from, the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transaction {
    Request(Request),
    Response(Response),
}

impl Transaction {
    /// Classify a raw transport message.
    ///
    /// Returns `None` for anything that is not a well-formed request or
    /// response.
    #[must_use]
    pub fn classify(message: &Value) -> Option<Self> {
        let transaction = Self::deserialize(message).ok()?;
        let well_formed = match &transaction {
            Transaction::Request(request) => request.is_well_formed(),
            Transaction::Response(response) => response.is_well_formed(),
        };
        well_formed.then_some(transaction)
    }

    /// Encode into the wire shape.
    pub fn to_message(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        match self {
            Transaction::Request(request) => request.id,
            Transaction::Response(response) => response.id,
        }
    }

    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Transaction::Request(request) => &request.message_type,
            Transaction::Response(response) => &response.message_type,
        }
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self, Transaction::Request(_))
    }

    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self, Transaction::Response(_))
    }

    #[must_use]
    pub fn into_request(self) -> Option<Request> {
        match self {
            Transaction::Request(request) => Some(request),
            Transaction::Response(_) => None,
        }
    }

    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Transaction::Response(response) => Some(response),
            Transaction::Request(_) => None,
        }
    }
}

impl From<Request> for Transaction {
    fn from(request: Request) -> Self {
        Transaction::Request(request)
    }
}

impl From<Response> for Transaction {
    fn from(response: Response) -> Self {
        Transaction::Response(response)
    }
}
