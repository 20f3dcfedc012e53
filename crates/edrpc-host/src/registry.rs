//! Capability registry: the static name→handler table.
//!
//! The registry is built once at startup and never changes afterwards, so
//! lookups need no locking. Handlers are invoked synchronously and only from
//! the owner thread's drain; a handler must not block indefinitely, since
//! that stalls every other queued item and the owner thread's own tick
//! cadence.

use std::collections::HashMap;

use edrpc_common::protocol::envelope::ArgMap;
use serde_json::Value;

/// Structured failure returned by a capability handler.
///
/// `kind` is a short tag naming the failure class (e.g., "NotFound"),
/// `message` the human-readable detail. Both end up in the error response,
/// formatted as `[method] kind: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Short failure class tag
    pub kind: String,
    /// Human-readable detail
    pub message: String,
}

impl HandlerFailure {
    /// Creates a handler failure.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Result of one handler invocation.
pub type HandlerResult = Result<Value, HandlerFailure>;

type Handler = Box<dyn Fn(&ArgMap) -> HandlerResult + Send + Sync>;

/// Name→handler table consulted by the dispatcher and invoked by the
/// owner-thread drain.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Handler>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `name`, replacing any previous handler with
    /// the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&ArgMap) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            tracing::warn!(%name, "capability registered twice, keeping the later handler");
        }
    }

    /// Looks up a handler by name.
    pub fn lookup(&self, name: &str) -> Option<&(dyn Fn(&ArgMap) -> HandlerResult + Send + Sync)> {
        self.handlers.get(name).map(|handler| handler.as_ref())
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted for stable listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
