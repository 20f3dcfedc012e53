//! Pending-call table.
//!
//! Maps correlation ids to unsettled call futures. Exactly one of
//! {settle-via-response, expire, abandon-all} resolves a given future: the
//! first writer removes the entry under the table mutex, so later attempts
//! find nothing and are no-ops. Responses whose id has no pending call are
//! silently discarded (late or duplicate).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use edrpc_common::protocol::envelope::CorrelationId;
use edrpc_common::protocol::error::{BridgeError, CallOutcome};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    timeout: JoinHandle<()>,
}

/// Table of calls awaiting responses, shared between the caller-facing API
/// and the receive loop. This is the only caller-side state touched from
/// more than one task, guarded by a single mutex.
#[derive(Clone, Default)]
pub struct PendingCallTable {
    inner: Arc<Mutex<HashMap<CorrelationId, PendingCall>>>,
}

impl PendingCallTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingCall>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a call and starts its expiry timer. The returned future
    /// settles exactly once.
    ///
    /// Must run inside a tokio runtime (the timer is a spawned task).
    pub fn register(&self, id: CorrelationId, timeout: Duration) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();

        let timer = {
            let table = self.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                table.expire(&id, timeout);
            })
        };

        if let Some(prior) = self.lock().insert(
            id.clone(),
            PendingCall {
                sender: tx,
                timeout: timer,
            },
        ) {
            // Ids must be unique among outstanding calls; replacing one
            // means the generator misbehaved. Drop the orphaned timer.
            prior.timeout.abort();
            tracing::warn!(%id, "correlation id reused while still outstanding");
        }

        rx
    }

    /// Settles the call with `outcome`. No-op when the id has no pending
    /// call — late and duplicate responses are discarded here.
    pub fn settle(&self, id: &str, outcome: CallOutcome) {
        let Some(call) = self.lock().remove(id) else {
            tracing::debug!(id, "no pending call for this id, discarding");
            return;
        };
        call.timeout.abort();
        // The caller may have stopped awaiting; that is its business.
        let _ = call.sender.send(outcome);
    }

    /// Timer path: fails the call with a timeout if it is still pending.
    /// The remote handler may still run to completion — only the caller's
    /// wait ends.
    fn expire(&self, id: &str, timeout: Duration) {
        let Some(call) = self.lock().remove(id) else {
            return;
        };
        tracing::debug!(id, "call timed out");
        let _ = call
            .sender
            .send(Err(BridgeError::Timeout(timeout.as_millis() as u64)));
    }

    /// Rejects every outstanding call with a disconnected failure carrying
    /// `reason`. Used when the connection is lost or explicitly closed.
    pub fn abandon_all(&self, reason: &str) {
        let drained: Vec<(CorrelationId, PendingCall)> = self.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), reason, "abandoning outstanding calls");
        for (_, call) in drained {
            call.timeout.abort();
            let _ = call.sender.send(Err(BridgeError::Disconnected(reason.to_string())));
        }
    }

    /// Number of calls currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }
}
