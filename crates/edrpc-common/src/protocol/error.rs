use thiserror::Error;

use crate::protocol::envelope::{
    RpcError, HANDLER_ERROR, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR, SHUTTING_DOWN,
};

/// Error taxonomy of the bridge.
///
/// The first four variants are wire-visible: they travel as JSON-RPC error
/// objects and their payload is the complete human-readable message.
/// `Timeout` and `Disconnected` are manufactured locally at the pending-call
/// table and never cross the wire.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Method name absent from the capability registry or protocol table
    #[error("{0}")]
    UnknownMethod(String),

    /// Well-formed request missing or mistyping a required argument
    #[error("{0}")]
    InvalidArguments(String),

    /// A capability handler returned or raised a failure
    #[error("{0}")]
    Handler(String),

    /// Malformed envelope
    #[error("{0}")]
    Protocol(String),

    /// No response arrived within the deadline; the remote handler may still
    /// run to completion
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// The peer connection dropped before the call settled
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// The host is tearing down; queued work was abandoned
    #[error("Shutting down")]
    ShuttingDown,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// JSON-RPC error code for this error when it is encoded into an error
    /// response. Local-only variants map to internal error; they are never
    /// actually sent.
    pub fn error_code(&self) -> i32 {
        match self {
            BridgeError::UnknownMethod(_) => METHOD_NOT_FOUND,
            BridgeError::InvalidArguments(_) => INVALID_PARAMS,
            BridgeError::Handler(_) => HANDLER_ERROR,
            BridgeError::Protocol(_) => INVALID_REQUEST,
            BridgeError::ShuttingDown => SHUTTING_DOWN,
            _ => INTERNAL_ERROR,
        }
    }

    /// Converts this error into a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.error_code(),
            message: self.to_string(),
        }
    }

    /// Maps a received JSON-RPC error object back onto the taxonomy.
    ///
    /// Unrecognized codes (including the server-error range) are treated as
    /// handler failures, which keeps foreign peers' custom codes visible in
    /// the message instead of being dropped.
    pub fn from_wire(error: &RpcError) -> Self {
        match error.code {
            METHOD_NOT_FOUND => BridgeError::UnknownMethod(error.message.clone()),
            INVALID_PARAMS => BridgeError::InvalidArguments(error.message.clone()),
            PARSE_ERROR | INVALID_REQUEST => BridgeError::Protocol(error.message.clone()),
            SHUTTING_DOWN => BridgeError::ShuttingDown,
            _ => BridgeError::Handler(error.message.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Outcome of one settled call: the result value or a stable failure.
pub type CallOutcome = std::result::Result<serde_json::Value, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BridgeError::UnknownMethod("x".into()).error_code(), -32601);
        assert_eq!(BridgeError::InvalidArguments("x".into()).error_code(), -32602);
        assert_eq!(BridgeError::Handler("x".into()).error_code(), -32000);
        assert_eq!(BridgeError::Protocol("x".into()).error_code(), -32600);
        assert_eq!(BridgeError::ShuttingDown.error_code(), -32002);
        assert_eq!(BridgeError::Timeout(30000).error_code(), -32603);
    }

    #[test]
    fn test_wire_round_trip_unknown_method() {
        let original = BridgeError::UnknownMethod("Unknown method: nope".into());
        let wire = original.to_rpc_error();
        assert_eq!(wire.code, -32601);
        assert_eq!(wire.message, "Unknown method: nope");

        match BridgeError::from_wire(&wire) {
            BridgeError::UnknownMethod(message) => assert_eq!(message, "Unknown method: nope"),
            other => panic!("expected UnknownMethod, got {:?}", other),
        }
    }

    #[test]
    fn test_from_wire_shutting_down() {
        let wire = RpcError {
            code: -32002,
            message: "Shutting down".into(),
        };
        assert!(matches!(BridgeError::from_wire(&wire), BridgeError::ShuttingDown));
    }

    #[test]
    fn test_from_wire_unrecognized_code_is_handler_failure() {
        let wire = RpcError {
            code: -32050,
            message: "[echo] Boom: it broke".into(),
        };
        match BridgeError::from_wire(&wire) {
            BridgeError::Handler(message) => assert_eq!(message, "[echo] Boom: it broke"),
            other => panic!("expected Handler, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(BridgeError::Timeout(30000).to_string(), "Request timeout after 30000ms");
    }
}
