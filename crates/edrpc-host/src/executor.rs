//! Owner-thread work queue.
//!
//! [`TickExecutor`] bridges "arbitrary-thread request" to "owner-thread
//! execution": any thread may [`submit`](TickExecutor::submit) work and gets
//! a completion future back immediately; only the owner thread's cooperative
//! tick calls [`drain_once`](TickExecutor::drain_once), which runs every
//! queued item in enqueue order.
//!
//! # Guarantees
//!
//! - Items execute strictly FIFO, never concurrently: the single drain loop
//!   gives handlers structural mutual exclusion.
//! - Every item completes exactly once — with the handler's outcome, or
//!   with a shutting-down failure when the executor is torn down first.
//! - A panicking handler is caught and reported as a failure; it never
//!   escapes the drain or aborts the remaining queued items.
//! - Expiry of the caller's wait does not remove an enqueued item: the
//!   handler still runs and its side effects stand; only the result is
//!   discarded.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};

use edrpc_common::protocol::envelope::{ArgMap, CorrelationId};
use edrpc_common::protocol::error::{BridgeError, CallOutcome};
use tokio::sync::oneshot;

use crate::registry::CapabilityRegistry;

/// A queued, not-yet-executed capability invocation.
struct WorkItem {
    id: CorrelationId,
    method: String,
    args: ArgMap,
    completion: oneshot::Sender<CallOutcome>,
}

struct Queue {
    items: VecDeque<WorkItem>,
    shut_down: bool,
}

/// Thread-safe FIFO work queue drained only by the owner thread.
pub struct TickExecutor {
    queue: Mutex<Queue>,
}

impl TickExecutor {
    /// Creates an empty executor.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                shut_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // Handlers run outside the lock and their panics are caught, so a
        // poisoned guard still holds a coherent queue.
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueues an invocation and returns its completion future.
    ///
    /// Callable from any thread; never blocks beyond the queue mutex. After
    /// [`shutdown`](Self::shutdown) the returned future resolves immediately
    /// to a shutting-down failure.
    pub fn submit(
        &self,
        id: CorrelationId,
        method: impl Into<String>,
        args: ArgMap,
    ) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut queue = self.lock();
        if queue.shut_down {
            drop(queue);
            let _ = tx.send(Err(BridgeError::ShuttingDown));
            return rx;
        }
        queue.items.push_back(WorkItem {
            id,
            method: method.into(),
            args,
            completion: tx,
        });
        rx
    }

    /// Executes every item queued at the moment of the call, in enqueue
    /// order, on the calling thread. Returns the number of items executed.
    ///
    /// Owner-thread only by contract: the embedder calls this from its
    /// cooperative tick (see [`BridgeHost::tick`](crate::BridgeHost::tick)).
    /// Items submitted while a drain is running wait for the next tick.
    pub fn drain_once(&self, registry: &CapabilityRegistry) -> usize {
        let items = std::mem::take(&mut self.lock().items);
        let drained = items.len();

        for item in items {
            let outcome = run_item(registry, &item.method, &item.args);
            if item.completion.send(outcome).is_err() {
                // Caller stopped waiting (timeout or disconnect). The side
                // effects stand; only the result is discarded.
                tracing::debug!(id = %item.id, method = %item.method, "discarding result for abandoned call");
            }
        }

        drained
    }

    /// Number of items currently queued.
    pub fn queued(&self) -> usize {
        self.lock().items.len()
    }

    /// Fails every queued-but-undrained item with a shutting-down failure
    /// and makes later submissions fail the same way. Idempotent.
    pub fn shutdown(&self) {
        let items = {
            let mut queue = self.lock();
            queue.shut_down = true;
            std::mem::take(&mut queue.items)
        };
        for item in items {
            tracing::debug!(id = %item.id, method = %item.method, "abandoning queued call on shutdown");
            let _ = item.completion.send(Err(BridgeError::ShuttingDown));
        }
    }
}

impl Default for TickExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn run_item(registry: &CapabilityRegistry, method: &str, args: &ArgMap) -> CallOutcome {
    // The dispatcher rejects unknown names before enqueueing; this re-check
    // keeps a direct submit from panicking the drain.
    let Some(handler) = registry.lookup(method) else {
        return Err(BridgeError::UnknownMethod(format!("Unknown method: {}", method)));
    };

    match catch_unwind(AssertUnwindSafe(|| handler(args))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(BridgeError::Handler(format!(
            "[{}] {}: {}",
            method, failure.kind, failure.message
        ))),
        Err(panic) => {
            tracing::error!(method, "capability handler panicked");
            Err(BridgeError::Handler(format!(
                "[{}] panic: {}",
                method,
                panic_message(panic.as_ref())
            )))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
