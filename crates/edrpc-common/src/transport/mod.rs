//! edrpc Transport Layer
//!
//! Message framing and connection state for the persistent bridge
//! connection.
//!
//! # Wire Format
//!
//! The transport is stream-oriented TCP, so the bridge is responsible for
//! message boundaries. Each logical message is one frame:
//!
//! ```text
//! [4-byte length as u32 big-endian] [JSON data]
//! ```
//!
//! # Components
//!
//! - [`framing`] - frame read/write over any `AsyncRead`/`AsyncWrite`
//! - [`ConnectionState`] - the per-peer-slot connection state machine

pub mod framing;

pub use framing::{read_frame, write_frame, MAX_MESSAGE_SIZE};

/// State of one logical peer slot.
///
/// Transitions: `Disconnected → Connecting → Connected → Disconnected` (on
/// close, error, or explicit disconnect). Leaving `Connected` abandons every
/// pending call tied to the connection before a new attempt may proceed; the
/// acceptor side never reports `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No peer; calls fail fast instead of queueing
    Disconnected,
    /// A connection attempt is in flight; further `connect()` calls are no-ops
    Connecting,
    /// One peer is attached and messages flow
    Connected,
}
