//! Initiator-role connection manager and call API.
//!
//! [`BridgeClient`] holds a fixed target endpoint. `connect()` is idempotent
//! and does not retry on failure — the retry policy belongs to the embedder.
//! While connected, a reader task settles responses against the pending-call
//! table; losing the connection abandons every outstanding call before the
//! slot is observed free again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use edrpc_common::protocol::builtin::{
    CapabilityDescriptor, CapabilityListing, ServerInfo, METHOD_INITIALIZE, METHOD_INVOKE,
    METHOD_LIST_CAPABILITIES,
};
use edrpc_common::protocol::envelope::{ArgMap, Message, RequestEnvelope, ResponseEnvelope};
use edrpc_common::protocol::error::{BridgeError, CallOutcome, Result};
use edrpc_common::transport::{framing, ConnectionState};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pending::PendingCallTable;

/// Timeout applied to every call unless overridden per call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`BridgeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host endpoint to connect to (e.g., "127.0.0.1:8765")
    pub addr: String,
    /// Default per-call timeout
    pub call_timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with the default call timeout.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

struct Link {
    generation: u64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct Conn {
    state: ConnectionState,
    link: Option<Link>,
}

struct ClientInner {
    config: ClientConfig,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    pending: PendingCallTable,
    conn: Mutex<Conn>,
    // Serializes connection attempts so `connect()` stays idempotent under
    // concurrent callers.
    connect_gate: tokio::sync::Mutex<()>,
}

/// Caller-side bridge client. Cheap to clone; all clones share the one
/// physical connection and pending-call table.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<ClientInner>,
}

impl BridgeClient {
    /// Creates a client for the given endpoint. No connection is made until
    /// [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                next_id: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                pending: PendingCallTable::new(),
                conn: Mutex::new(Conn {
                    state: ConnectionState::Disconnected,
                    link: None,
                }),
                connect_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Connects to the host endpoint. No-op when already connected or a
    /// connection attempt is in flight; a failed attempt is reported once,
    /// without retry.
    pub async fn connect(&self) -> Result<()> {
        let _gate = self.inner.connect_gate.lock().await;

        {
            let mut conn = self.inner.conn();
            match conn.state {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Disconnected => conn.state = ConnectionState::Connecting,
            }
        }

        match TcpStream::connect(&self.inner.config.addr).await {
            Ok(stream) => {
                self.inner.install(stream);
                tracing::info!(addr = %self.inner.config.addr, "connected to bridge host");
                Ok(())
            }
            Err(e) => {
                self.inner.conn().state = ConnectionState::Disconnected;
                Err(BridgeError::Connection(format!(
                    "Failed to connect to {}: {}",
                    self.inner.config.addr, e
                )))
            }
        }
    }

    /// Explicitly drops the connection. Every outstanding call is rejected
    /// as disconnected. No-op when already disconnected.
    pub fn disconnect(&self) {
        // The drain runs while the slot is still held, so no concurrent
        // connect or call can interleave between it and the state change.
        let mut conn = self.inner.conn();
        conn.state = ConnectionState::Disconnected;
        if let Some(link) = conn.link.take() {
            link.reader.abort();
            link.writer.abort();
            self.inner.pending.abandon_all("disconnected by caller");
            tracing::info!("disconnected from bridge host");
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.conn().state
    }

    /// Number of calls awaiting a response.
    pub fn outstanding_calls(&self) -> usize {
        self.inner.pending.outstanding()
    }

    /// Issues a raw call with the default timeout.
    pub async fn call(&self, method: impl Into<String>, params: ArgMap) -> Result<Value> {
        self.call_with_timeout(method, params, self.inner.config.call_timeout)
            .await
    }

    /// Issues a raw call with an explicit timeout.
    ///
    /// The future resolves exactly once: with the host's result, the host's
    /// failure, a local timeout, or a local disconnect. Expiry does not
    /// cancel the host-side handler — only this caller's wait.
    pub async fn call_with_timeout(
        &self,
        method: impl Into<String>,
        params: ArgMap,
        timeout: Duration,
    ) -> Result<Value> {
        let method = method.into();

        let tx = {
            let conn = self.inner.conn();
            match (&conn.state, &conn.link) {
                (ConnectionState::Connected, Some(link)) => link.tx.clone(),
                _ => return Err(BridgeError::Disconnected("not connected".into())),
            }
        };

        let id = (self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let frame = RequestEnvelope::new(id.clone(), method, params).encode()?;

        // Register before sending so a fast response cannot miss the table.
        let rx = self.inner.pending.register(id.clone(), timeout);
        if tx.send(frame).is_err() {
            self.inner
                .pending
                .settle(&id, Err(BridgeError::Disconnected("connection closed while sending".into())));
        }

        match rx.await {
            Ok(outcome) => outcome,
            // The sender can only drop without settling if the table itself
            // is torn down mid-call.
            Err(_) => Err(BridgeError::Disconnected("call abandoned".into())),
        }
    }

    /// Runs the `initialize` handshake and returns the host metadata.
    pub async fn initialize(&self) -> Result<ServerInfo> {
        let value = self.call(METHOD_INITIALIZE, ArgMap::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Lists the host's registered capability names.
    pub async fn capabilities(&self) -> Result<Vec<CapabilityDescriptor>> {
        let value = self.call(METHOD_LIST_CAPABILITIES, ArgMap::new()).await?;
        let listing: CapabilityListing = serde_json::from_value(value)?;
        Ok(listing.tools)
    }

    /// Invokes a capability by name with the default timeout.
    pub async fn invoke(&self, name: impl Into<String>, arguments: ArgMap) -> Result<Value> {
        self.invoke_with_timeout(name, arguments, self.inner.config.call_timeout)
            .await
    }

    /// Invokes a capability by name with an explicit timeout.
    pub async fn invoke_with_timeout(
        &self,
        name: impl Into<String>,
        arguments: ArgMap,
        timeout: Duration,
    ) -> Result<Value> {
        let mut params = ArgMap::new();
        params.insert("name".into(), Value::String(name.into()));
        params.insert("arguments".into(), Value::Object(arguments));
        self.call_with_timeout(METHOD_INVOKE, params, timeout).await
    }
}

impl ClientInner {
    fn conn(&self) -> MutexGuard<'_, Conn> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Installs a freshly connected stream: reader and writer tasks plus the
    /// outbound channel, under a new generation.
    fn install(self: &Arc<Self>, stream: TcpStream) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        // Held across the spawns: a connection that dies instantly blocks in
        // on_disconnect until the link is actually installed.
        let mut conn = self.conn();
        let writer = tokio::spawn(write_loop(write_half, rx));
        let reader = {
            let inner = Arc::clone(self);
            tokio::spawn(read_loop(inner, read_half, generation))
        };
        conn.state = ConnectionState::Connected;
        conn.link = Some(Link {
            generation,
            tx,
            reader,
            writer,
        });
    }

    /// Handles one frame from the host: responses settle their pending
    /// call; anything else is logged and dropped.
    fn on_frame(&self, frame: Vec<u8>) {
        match Message::decode(&frame) {
            Ok(Message::Response(response)) => self.on_response(response),
            Ok(Message::Request(request)) => {
                // The host never calls back into the client.
                tracing::debug!(method = %request.method, "ignoring request envelope from host");
            }
            Err(decode_err) => {
                tracing::warn!("bad message from host: {}", decode_err.detail);
            }
        }
    }

    fn on_response(&self, response: ResponseEnvelope) {
        let Some(id) = response.id else {
            tracing::debug!("response without correlation id, discarding");
            return;
        };
        let outcome: CallOutcome = match response.error {
            Some(error) => Err(BridgeError::from_wire(&error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        // Unknown ids are discarded inside the table (late or duplicate).
        self.pending.settle(&id, outcome);
    }

    /// Runs when the reader observed close or error. Only the generation
    /// that owns the link may clear it; a stale generation means the link
    /// was already replaced or explicitly closed.
    ///
    /// Pending calls are abandoned while the slot is still held, so no new
    /// connection attempt can observe the slot as free before the drain has
    /// finished.
    fn on_disconnect(&self, generation: u64, reason: &str) {
        let mut conn = self.conn();
        let owns = conn
            .link
            .as_ref()
            .map_or(false, |link| link.generation == generation);
        if !owns {
            return;
        }
        self.pending.abandon_all(reason);
        conn.state = ConnectionState::Disconnected;
        if let Some(link) = conn.link.take() {
            link.writer.abort();
        }
        tracing::info!(reason, "connection to bridge host lost");
    }
}

async fn read_loop(inner: Arc<ClientInner>, mut read_half: OwnedReadHalf, generation: u64) {
    let reason = loop {
        match framing::read_frame(&mut read_half).await {
            Ok(Some(frame)) => inner.on_frame(frame),
            Ok(None) => break "connection closed by host".to_string(),
            Err(e) => break format!("connection lost: {}", e),
        }
    };
    inner.on_disconnect(generation, &reason);
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = framing::write_frame(&mut write_half, &frame).await {
            tracing::warn!("write to bridge host failed: {}", e);
            break;
        }
    }
}
