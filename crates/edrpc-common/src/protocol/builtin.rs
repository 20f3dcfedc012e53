//! Built-in method schemas
//!
//! Three methods exist outside the capability registry and are handled by
//! the dispatcher itself: `initialize` returns static server metadata,
//! `tools/list` returns the registry's method names, and `tools/call`
//! carries a nested capability invocation — the sole path into the registry.
//! The typed structs here are the single source of truth for their wire
//! shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::envelope::ArgMap;

/// Handshake method returning static server metadata.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Method listing the capability registry's names.
pub const METHOD_LIST_CAPABILITIES: &str = "tools/list";
/// Method carrying a nested capability invocation.
pub const METHOD_INVOKE: &str = "tools/call";

/// Protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Identity block nested inside the `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Host name (e.g., "edrpc-host")
    pub name: String,
    /// Version string from Cargo.toml
    pub version: String,
}

/// Result of the `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    /// Protocol revision the host speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Feature flags, by category
    pub capabilities: Value,
    /// Host identity
    #[serde(rename = "serverInfo")]
    pub server_info: ServerIdentity,
}

impl ServerInfo {
    /// Creates the metadata block for a host with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({ "tools": {}, "experimental": {} }),
            server_info: ServerIdentity {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        }
    }
}

/// One entry in the capability listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    /// Registered method name
    pub name: String,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityListing {
    /// Registry contents, sorted by name
    pub tools: Vec<CapabilityDescriptor>,
}

/// Parameters of `tools/call`: the nested capability name plus its
/// argument map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeParams {
    /// Capability to invoke
    pub name: String,
    /// Arguments forwarded to the handler; omitted means empty
    #[serde(default)]
    pub arguments: ArgMap,
}
