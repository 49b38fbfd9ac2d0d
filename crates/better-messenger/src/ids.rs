//! Transaction identifiers.
//!
//! Ids come from an explicit [`IdGenerator`] rather than a hidden global
//! counter. One generator is shared process-wide by default
//! ([`IdGenerator::shared`]); tests and embedders may inject their own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Identifier correlating a request with its response.
///
/// A response carries the id of the request it answers. Uniqueness holds for
/// ids drawn from one generator; ids are never reused by that generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wrap a raw id, e.g. one received over the transport.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<TransactionId> for u64 {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

/// Monotonically increasing id source.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

static SHARED: OnceLock<Arc<IdGenerator>> = OnceLock::new();

impl IdGenerator {
    /// Create a generator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a generator whose first id is `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// The process-wide generator used when none is injected.
    pub fn shared() -> Arc<IdGenerator> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(IdGenerator::new())))
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the id the next call to [`next_id`](Self::next_id) returns.
    #[must_use]
    pub fn peek(&self) -> TransactionId {
        TransactionId(self.next.load(Ordering::Relaxed))
    }
}
