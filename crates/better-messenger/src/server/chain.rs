//! Dispatch chain: walks the matched handlers of one request in order.
//!
//! Each handler receives a [`Next`] continuation for the rest of the chain.
//! The chain advances only when a handler consumes it, so a handler that
//! returns without calling `next` stops every later handler.
//!
//! ```text
//! step(0) ─ handler 0 ─ next.run() ─▶ step(1) ─ handler 1 ─ (returns)
//!                │                                  │
//!                └── Err / next.fail() ─────────────┴──▶ error handler
//! ```

use super::handler::{ErrorHandler, RequestHandler};
use crate::error::HandlerError;
use crate::ids::TransactionId;
use crate::responder::Responder;
use crate::transaction::Request;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// Where a dispatch chain stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainState {
    /// The innermost handler run so far has not called `next`.
    #[default]
    Pending,
    /// `next` was called; the chain moved on or ran past its end.
    Advanced,
    /// An error was routed to the error handler.
    Errored,
    /// The chain finished after a response was sent, without errors.
    Settled,
}

/// Summary of one finished dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub request_id: TransactionId,
    pub state: ChainState,
    /// Handlers selected at dispatch start.
    pub handlers_matched: usize,
    /// Handlers actually invoked.
    pub handlers_run: usize,
    /// Whether a response was posted for the request.
    pub responded: bool,
}

#[derive(Debug, Default)]
struct Progress {
    state: ChainState,
    handlers_run: usize,
}

struct Chain {
    request: Request,
    responder: Responder,
    /// Snapshot of the matched handlers, taken at dispatch start.
    handlers: Vec<Arc<dyn RequestHandler>>,
    error_handler: Arc<dyn ErrorHandler>,
    progress: Mutex<Progress>,
}

impl Chain {
    fn transition(&self, state: ChainState) {
        let mut progress = self.progress.lock();
        if progress.state != ChainState::Errored {
            progress.state = state;
        }
    }

    fn enter(&self) {
        let mut progress = self.progress.lock();
        progress.handlers_run += 1;
        if progress.state != ChainState::Errored {
            progress.state = ChainState::Pending;
        }
    }

    fn route_error(&self, error: HandlerError) {
        self.progress.lock().state = ChainState::Errored;
        warn!(
            id = %self.request.id,
            message_type = %self.request.message_type,
            error = %error,
            "Handler failed"
        );
        self.error_handler
            .handle_error(&error, &self.request, &self.responder);
    }

    fn report(&self) -> DispatchReport {
        let responded = self.responder.is_sent();
        let progress = self.progress.lock();
        let state = match progress.state {
            ChainState::Errored => ChainState::Errored,
            _ if responded => ChainState::Settled,
            state => state,
        };
        DispatchReport {
            request_id: self.request.id,
            state,
            handlers_matched: self.handlers.len(),
            handlers_run: progress.handlers_run,
            responded,
        }
    }
}

/// Continuation for the rest of a dispatch chain.
///
/// Consumed on use, so a handler can advance its chain at most once.
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    /// Run the remaining handlers. Returns once they have finished.
    pub async fn run(self) {
        self.chain.transition(ChainState::Advanced);
        step(self.chain, self.index).await;
    }

    /// Route `error` to the error handler instead of continuing.
    pub async fn fail(self, error: HandlerError) {
        self.chain.route_error(error);
    }

    /// Whether no handler remains after the current one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index >= self.chain.handlers.len()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("request_id", &self.chain.request.id)
            .field("index", &self.index)
            .field("remaining", &self.chain.handlers.len().saturating_sub(self.index))
            .finish()
    }
}

fn step(chain: Arc<Chain>, index: usize) -> BoxFuture<'static, ()> {
    async move {
        let Some(handler) = chain.handlers.get(index).cloned() else {
            return;
        };

        chain.enter();
        let next = Next {
            chain: Arc::clone(&chain),
            index: index + 1,
        };
        let run = handler.handle(chain.request.clone(), chain.responder.clone(), next);

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => chain.route_error(error),
            Err(_) => chain.route_error(HandlerError::internal("handler panicked")),
        }
    }
    .boxed()
}

/// Run `handlers` for one request, in order, and report how it went.
pub(crate) async fn dispatch(
    request: Request,
    responder: Responder,
    handlers: Vec<Arc<dyn RequestHandler>>,
    error_handler: Arc<dyn ErrorHandler>,
) -> DispatchReport {
    let chain = Arc::new(Chain {
        request,
        responder,
        handlers,
        error_handler,
        progress: Mutex::new(Progress::default()),
    });
    step(Arc::clone(&chain), 0).await;
    chain.report()
}
