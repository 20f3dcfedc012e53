//! edrpc Client
//!
//! Caller side of the bridge: connects to a known host endpoint, multiplexes
//! many concurrent logical calls over the one physical connection, and
//! correlates each response back to the right waiting caller.
//!
//! # Failure Behavior
//!
//! Every call resolves — to a value, a failure reported by the host, a
//! locally manufactured timeout, or a disconnect. No call is left hanging:
//! losing the connection abandons every outstanding call with a
//! disconnected failure.
//!
//! # Example
//!
//! ```no_run
//! use edrpc_client::{BridgeClient, ClientConfig};
//! use serde_json::{json, Map};
//!
//! # async fn run() -> edrpc_common::Result<()> {
//! let client = BridgeClient::new(ClientConfig::new("127.0.0.1:8765"));
//! client.connect().await?;
//!
//! let mut args = Map::new();
//! args.insert("x".into(), json!(5));
//! let result = client.invoke("echo", args).await?;
//! assert_eq!(result, json!({"x": 5}));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod pending;

pub use client::{BridgeClient, ClientConfig, DEFAULT_CALL_TIMEOUT};
pub use pending::PendingCallTable;
