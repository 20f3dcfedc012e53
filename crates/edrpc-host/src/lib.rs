//! edrpc Host
//!
//! Execution side of the bridge: accepts one peer on a fixed endpoint,
//! decodes incoming requests, and marshals capability invocations onto the
//! owner thread.
//!
//! # Threading Model
//!
//! Network I/O runs on tokio tasks; capability handlers run only on the
//! owner thread — whichever thread the embedder calls
//! [`BridgeHost::tick`] from. The only state shared between the two is the
//! executor's work queue, guarded by a single mutex. Handlers therefore
//! never need locking against each other: the drain gives them mutual
//! exclusion structurally.
//!
//! # Example
//!
//! ```no_run
//! use edrpc_host::{BridgeHost, CapabilityRegistry, HostConfig};
//! use serde_json::Value;
//!
//! # async fn run() -> edrpc_common::Result<()> {
//! let mut registry = CapabilityRegistry::new();
//! registry.register("ping", |_args| Ok(Value::String("pong".into())));
//!
//! let mut host = BridgeHost::start(HostConfig::default(), registry).await?;
//! loop {
//!     // ... the embedder's frame/update loop ...
//!     host.tick();
//! }
//! # }
//! ```

mod connection;
mod dispatcher;

pub mod executor;
pub mod host;
pub mod registry;

pub use executor::TickExecutor;
pub use host::{BridgeHost, HostConfig};
pub use registry::{CapabilityRegistry, HandlerFailure, HandlerResult};
