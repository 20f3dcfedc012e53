//! edrpc Protocol Layer
//!
//! Envelope types, error taxonomy, and built-in method schemas.
//!
//! # Components
//!
//! - [`envelope`] - JSON-RPC 2.0 request/response envelopes and decoding
//! - [`error`] - the [`BridgeError`] taxonomy and wire-code mapping
//! - [`builtin`] - typed schemas for `initialize` and `tools/list`

pub mod builtin;
pub mod envelope;
pub mod error;

pub use envelope::{
    ArgMap, CorrelationId, DecodeError, Message, RequestEnvelope, ResponseEnvelope, RpcError,
};
pub use error::{BridgeError, CallOutcome, Result};
