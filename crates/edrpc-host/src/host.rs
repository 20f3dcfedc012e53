//! The bridge host owner object.
//!
//! [`BridgeHost`] ties the acceptor, the dispatcher, and the tick executor
//! together with an explicit lifetime: constructed at process start with a
//! fully built registry, ticked by the embedder's loop, torn down with
//! [`shutdown`](BridgeHost::shutdown). No ambient global state — tests
//! construct isolated instances on port 0.

use std::net::SocketAddr;
use std::sync::Arc;

use edrpc_common::protocol::error::Result;
use edrpc_common::transport::ConnectionState;

use crate::connection::Acceptor;
use crate::dispatcher::Dispatcher;
use crate::executor::TickExecutor;
use crate::registry::CapabilityRegistry;

/// Configuration for a [`BridgeHost`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address the acceptor binds to. Both peers know this endpoint; use
    /// port 0 in tests to get an ephemeral one.
    pub bind: String,
    /// Name reported by the `initialize` handshake.
    pub server_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".into(),
            server_name: "edrpc-host".into(),
        }
    }
}

/// Execution-side bridge: one listener, one peer, one owner thread.
///
/// The embedder decides which thread is the owner thread by calling
/// [`tick`](Self::tick) from it; `tick` takes `&mut self` so two ticks can
/// never overlap.
pub struct BridgeHost {
    registry: Arc<CapabilityRegistry>,
    executor: Arc<TickExecutor>,
    acceptor: Acceptor,
}

impl BridgeHost {
    /// Binds the listener and starts accepting.
    ///
    /// The registry is fixed for the host's lifetime — a static mapping
    /// built at startup, not mutated afterwards.
    pub async fn start(config: HostConfig, registry: CapabilityRegistry) -> Result<Self> {
        let registry = Arc::new(registry);
        let executor = Arc::new(TickExecutor::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            executor.clone(),
            config.server_name,
        ));
        let acceptor = Acceptor::bind(&config.bind, dispatcher).await?;

        tracing::info!(addr = %acceptor.local_addr(), capabilities = registry.len(), "bridge host listening");

        Ok(Self {
            registry,
            executor,
            acceptor,
        })
    }

    /// Actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Connection state of the single peer slot.
    pub fn state(&self) -> ConnectionState {
        self.acceptor.state()
    }

    /// Number of invocations waiting for the next tick.
    pub fn queued(&self) -> usize {
        self.executor.queued()
    }

    /// Runs one cooperative tick: executes every queued invocation, in
    /// arrival order, on the calling thread. Returns the number executed.
    pub fn tick(&mut self) -> usize {
        self.executor.drain_once(&self.registry)
    }

    /// Stops accepting, drops the current peer, and fails queued work with
    /// a shutting-down failure instead of leaving it pending. Idempotent.
    pub fn shutdown(&mut self) {
        self.acceptor.shutdown();
        self.executor.shutdown();
        tracing::info!("bridge host shut down");
    }
}

impl Drop for BridgeHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
