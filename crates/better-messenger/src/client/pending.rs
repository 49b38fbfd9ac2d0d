//! Pending-task table: correlates outstanding requests with their waiters.
//!
//! Flow:
//! 1. `Client::send` calls `register()` to get a oneshot receiver
//! 2. The request is posted to the transport
//! 3. The receive path calls `settle()` with the matching response
//! 4. The sender awaits the receiver or times out and calls `expire()`
//!
//! A task leaves the table exactly once: on settle, expiry, explicit removal
//! or client close, whichever comes first.

use crate::error::ClientError;
use crate::ids::TransactionId;
use crate::transaction::{Request, Response};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// Final outcome delivered to a waiting request.
pub(crate) type Settlement = Result<Response, ClientError>;

/// One outstanding request.
struct Task {
    /// The request as it was posted
    request: Request,
    /// Channel to the waiting caller
    sender: oneshot::Sender<Settlement>,
    /// When the task was registered
    created_at: Instant,
}

impl Task {
    fn settle(self, result: Settlement) -> bool {
        self.sender.send(result).is_ok()
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Counters for the pending-task table
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Total tasks registered
    pub registered: AtomicU64,
    /// Total tasks settled by a response (success or failure)
    pub completed: AtomicU64,
    /// Total tasks that timed out
    pub timed_out: AtomicU64,
    /// Responses dropped because no task matched their id
    pub discarded: AtomicU64,
    /// Tasks dropped by `close()` or explicit removal
    pub abandoned: AtomicU64,
}

impl TaskStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Map from request id to outstanding task.
#[derive(Default)]
pub(crate) struct TaskTable {
    tasks: DashMap<TransactionId, Task>,
    stats: TaskStats,
}

impl TaskTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a task for `request`. Must happen before the request is posted.
    pub(crate) fn register(&self, request: Request) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        let id = request.id;
        let method = request.message_type.clone();

        let task = Task {
            request,
            sender: tx,
            created_at: Instant::now(),
        };

        // A replaced task's waiter observes a closed channel.
        self.tasks.insert(id, task);
        TaskStats::bump(&self.stats.registered);

        debug!(id = %id, message_type = %method, "Registered pending task");
        rx
    }

    pub(crate) fn contains(&self, id: TransactionId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Remove the task for `id` and hand it `result`.
    ///
    /// Returns false if no task was pending (already settled or expired).
    pub(crate) fn settle(&self, id: TransactionId, result: Settlement) -> bool {
        let Some((_, task)) = self.tasks.remove(&id) else {
            debug!(id = %id, "Task settled elsewhere before its response was processed");
            return false;
        };

        let ok = result.is_ok();
        let elapsed = task.age();
        let message_type = task.request.message_type.clone();
        let delivered = task.settle(result);
        TaskStats::bump(&self.stats.completed);

        debug!(
            id = %id,
            message_type = %message_type,
            success = ok,
            delivered = delivered,
            response_time_ms = elapsed.as_millis(),
            "Completed pending task"
        );
        delivered
    }

    /// Drop the task for `id` after its timeout fired.
    pub(crate) fn expire(&self, id: TransactionId) {
        if let Some((_, task)) = self.tasks.remove(&id) {
            TaskStats::bump(&self.stats.timed_out);
            debug!(
                id = %id,
                message_type = %task.request.message_type,
                elapsed_ms = task.age().as_millis(),
                "Pending task timed out"
            );
        }
    }

    /// Unconditionally drop the task for `id`, leaving its waiter to observe a
    /// closed channel.
    pub(crate) fn remove(&self, id: TransactionId) -> bool {
        let removed = self.tasks.remove(&id).is_some();
        if removed {
            TaskStats::bump(&self.stats.abandoned);
        }
        removed
    }

    /// Count a response whose id matched no task.
    pub(crate) fn record_discarded(&self, id: TransactionId) {
        TaskStats::bump(&self.stats.discarded);
        debug!(id = %id, "Response for unknown or expired id discarded");
    }

    /// Reject every pending task with [`ClientError::Closed`].
    pub(crate) fn abandon_all(&self) -> usize {
        let ids: Vec<TransactionId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        let mut abandoned = 0;
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                task.settle(Err(ClientError::Closed));
                TaskStats::bump(&self.stats.abandoned);
                abandoned += 1;
            }
        }
        abandoned
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn stats(&self) -> &TaskStats {
        &self.stats
    }
}
