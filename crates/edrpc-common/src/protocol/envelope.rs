//! JSON-RPC 2.0 Envelope Types
//!
//! Every message on the wire is one complete envelope:
//!
//! - Request: `{"jsonrpc":"2.0","id":"<string>","method":"<string>","params":{...}}`
//! - Success response: `{"jsonrpc":"2.0","id":"<string>","result":<any>}`
//! - Error response: `{"jsonrpc":"2.0","id":"<string or null>","error":{"code":<int>,"message":"<string>"}}`
//!
//! # Error Codes
//!
//! Standard JSON-RPC 2.0 error codes:
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000` to `-32099`: Server error
//!
//! # Decoding
//!
//! [`Message::decode`] never panics on malformed input. It returns a
//! [`DecodeError`] that carries the correlation id when one could be
//! recovered from the raw JSON, so the receiver can answer with a
//! protocol-level error response instead of dropping the message silently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Correlation identifier linking a request to its eventual response.
///
/// Ids are opaque strings generated by the caller. They only need to be
/// unique among the calls currently outstanding on one connection.
pub type CorrelationId = String;

/// Argument map carried by a request: string keys, structured JSON values
/// (null, bool, number, string, array, object). No other coercion is applied.
pub type ArgMap = Map<String, Value>;

/// JSON-RPC version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC 2.0 error codes
/// Invalid JSON was received
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid envelope
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error
pub const INTERNAL_ERROR: i32 = -32603;
/// A capability handler returned or raised a failure
pub const HANDLER_ERROR: i32 = -32000;
/// The host is tearing down; queued work was abandoned
pub const SHUTTING_DOWN: i32 = -32002;

/// A request envelope. Immutable once sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Correlation id, unique among outstanding calls on this connection
    pub id: CorrelationId,
    /// Name of the method to invoke
    pub method: String,
    /// Named arguments; omitted on the wire means empty
    #[serde(default)]
    pub params: ArgMap,
}

impl RequestEnvelope {
    /// Creates a request envelope.
    pub fn new(id: impl Into<CorrelationId>, method: impl Into<String>, params: ArgMap) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Encodes the envelope to its wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// Error code (standard codes are negative integers)
    pub code: i32,
    /// Human-readable description, including causal detail where available
    pub message: String,
}

/// A response envelope. Exactly one exists per request ever delivered to the
/// execution side; `result` and `error` are mutually exclusive on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Correlation id of the originating request; `None` when the request id
    /// could not be recovered from a malformed message
    pub id: Option<CorrelationId>,
    /// Result value on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponseEnvelope {
    /// Creates a success response carrying `result`.
    pub fn success(id: impl Into<CorrelationId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response. `id` is `None` when the originating
    /// request id could not be recovered.
    pub fn failure(id: Option<CorrelationId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Encodes the envelope to its wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A decoded wire message: either a request or a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// An incoming request envelope
    Request(RequestEnvelope),
    /// An incoming response envelope
    Response(ResponseEnvelope),
}

/// Malformed wire input.
///
/// `id` holds the correlation id when the raw JSON yielded one, so the
/// receiver can answer with a protocol error; otherwise the message can only
/// be logged and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// Correlation id recovered from the raw JSON, if any
    pub id: Option<CorrelationId>,
    /// Human-readable description of what was wrong
    pub detail: String,
}

impl Message {
    /// Decodes one wire message.
    ///
    /// A JSON object with a `method` key is a request; one with a `result`
    /// or `error` key is a response. Anything else, including invalid JSON,
    /// yields a [`DecodeError`] — this function never panics on peer input.
    pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
        let value: Value = serde_json::from_slice(data).map_err(|e| DecodeError {
            id: None,
            detail: format!("invalid JSON: {}", e),
        })?;

        let id = recover_id(&value);

        let Some(object) = value.as_object() else {
            return Err(DecodeError {
                id,
                detail: "envelope is not a JSON object".into(),
            });
        };

        if object.contains_key("method") {
            let request: RequestEnvelope =
                serde_json::from_value(value.clone()).map_err(|e| DecodeError {
                    id: id.clone(),
                    detail: format!("malformed request envelope: {}", e),
                })?;
            Ok(Message::Request(request))
        } else if object.contains_key("result") || object.contains_key("error") {
            let response: ResponseEnvelope =
                serde_json::from_value(value.clone()).map_err(|e| DecodeError {
                    id: id.clone(),
                    detail: format!("malformed response envelope: {}", e),
                })?;
            Ok(Message::Response(response))
        } else {
            Err(DecodeError {
                id,
                detail: "envelope has neither method nor result/error".into(),
            })
        }
    }
}

/// Best-effort correlation id recovery from raw JSON. Numeric ids from
/// foreign peers are stringified, matching the string-id wire contract.
fn recover_id(value: &Value) -> Option<CorrelationId> {
    match value.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
