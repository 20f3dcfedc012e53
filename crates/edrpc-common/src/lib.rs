//! edrpc Common Types and Transport
//!
//! This crate provides the protocol definitions and framed TCP transport
//! primitives shared by the edrpc host and client.
//!
//! # Overview
//!
//! edrpc is an editor automation bridge: a long-lived host process exposes a
//! single-threaded mutable world to one external client over a persistent
//! connection. Named commands travel as JSON-RPC 2.0 envelopes, execute
//! exactly once on the host's owner thread in arrival order, and their
//! results are correlated back to the original caller. This crate contains
//! the pieces both sides agree on:
//!
//! - **Protocol Layer**: request/response envelopes, the error taxonomy, and
//!   the built-in method schemas (`initialize`, `tools/list`, `tools/call`)
//! - **Transport Layer**: message framing and connection state
//!
//! # Wire Format
//!
//! - **Transport**: one persistent TCP connection
//! - **Serialization**: JSON-RPC 2.0 with string correlation ids
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 16 MB (prevents memory exhaustion)
//!
//! # Example
//!
//! ```
//! use edrpc_common::protocol::envelope::{Message, RequestEnvelope};
//! use serde_json::{json, Map};
//!
//! let mut params = Map::new();
//! params.insert("name".into(), json!("echo"));
//! let request = RequestEnvelope::new("1", "tools/call", params);
//! let bytes = request.encode().unwrap();
//!
//! match Message::decode(&bytes).unwrap() {
//!     Message::Request(req) => assert_eq!(req.method, "tools/call"),
//!     Message::Response(_) => unreachable!(),
//! }
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::envelope::{
    ArgMap, CorrelationId, DecodeError, Message, RequestEnvelope, ResponseEnvelope, RpcError,
};
pub use protocol::error::{BridgeError, CallOutcome, Result};
pub use transport::ConnectionState;
