//! Acceptor-role connection manager.
//!
//! Listens on a fixed endpoint and keeps at most one active peer. A new
//! connection replaces the previous peer (last-connection-wins): the old
//! peer's reader and writer tasks are aborted, which closes its socket and
//! lets the replaced client run its own disconnect handling. Outbound sends
//! after a peer is gone are silent no-ops, never errors.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use edrpc_common::protocol::error::{BridgeError, Result};
use edrpc_common::transport::{framing, ConnectionState};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;

/// Handle for sending frames back to the peer a request arrived from.
///
/// Cheap to clone into spawned response tasks. When the peer has since
/// disconnected (or been replaced), [`send`](Self::send) drops the frame.
#[derive(Clone)]
pub(crate) struct PeerSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl PeerSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Queues a frame for the writer task. Silent no-op after disconnect.
    pub(crate) fn send(&self, frame: Vec<u8>) {
        if self.tx.send(frame).is_err() {
            tracing::debug!("peer gone, dropping outbound frame");
        }
    }
}

struct ActivePeer {
    generation: u64,
    addr: SocketAddr,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct PeerSlot {
    inner: Mutex<Option<ActivePeer>>,
    next_generation: AtomicU64,
}

impl PeerSlot {
    fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            next_generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActivePeer>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Installs a freshly accepted peer, replacing and aborting any prior
    /// one (last-connection-wins).
    fn install(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr, dispatcher: Arc<Dispatcher>) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        // Held across the spawns: a peer that disconnects instantly blocks
        // in clear() until its entry is actually in the slot.
        let mut slot = self.lock();
        let writer = tokio::spawn(write_loop(write_half, rx));
        let reader = {
            let slot = Arc::clone(self);
            let sender = PeerSender::new(tx);
            tokio::spawn(read_loop(read_half, sender, dispatcher, slot, generation))
        };

        let prior = slot.replace(ActivePeer {
            generation,
            addr,
            reader,
            writer,
        });
        drop(slot);

        match prior {
            Some(prior) => {
                tracing::info!(prior = %prior.addr, peer = %addr, "replacing connected peer");
                prior.reader.abort();
                prior.writer.abort();
            }
            None => tracing::info!(peer = %addr, "peer connected"),
        }
    }

    /// Clears the slot when the peer whose reader observed the close is
    /// still the active one. A stale generation means the peer was already
    /// replaced and the slot belongs to its successor.
    fn clear(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.as_ref().map_or(false, |peer| peer.generation == generation) {
            if let Some(peer) = slot.take() {
                tracing::info!(peer = %peer.addr, "peer disconnected");
                peer.writer.abort();
            }
        }
    }

    fn close(&self) {
        if let Some(peer) = self.lock().take() {
            tracing::info!(peer = %peer.addr, "closing peer connection");
            peer.reader.abort();
            peer.writer.abort();
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    sender: PeerSender,
    dispatcher: Arc<Dispatcher>,
    slot: Arc<PeerSlot>,
    generation: u64,
) {
    loop {
        match framing::read_frame(&mut read_half).await {
            Ok(Some(frame)) => dispatcher.on_frame(&sender, frame),
            Ok(None) => {
                tracing::debug!("peer closed connection");
                break;
            }
            Err(e) => {
                tracing::warn!("peer read failed: {}", e);
                break;
            }
        }
    }
    slot.clear(generation);
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = framing::write_frame(&mut write_half, &frame).await {
            tracing::warn!("peer write failed: {}", e);
            break;
        }
    }
}

async fn accept_loop(listener: TcpListener, slot: Arc<PeerSlot>, dispatcher: Arc<Dispatcher>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => slot.install(stream, addr, dispatcher.clone()),
            Err(e) => tracing::warn!("accept failed: {}", e),
        }
    }
}

/// The listener plus its single peer slot.
pub(crate) struct Acceptor {
    local_addr: SocketAddr,
    slot: Arc<PeerSlot>,
    accept_task: JoinHandle<()>,
}

impl Acceptor {
    /// Binds `addr` and starts accepting. At most one peer is active at a
    /// time; new connections replace the previous peer.
    pub(crate) async fn bind(addr: &str, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Connection(format!("Failed to get local addr: {}", e)))?;

        let slot = Arc::new(PeerSlot::new());
        let accept_task = tokio::spawn(accept_loop(listener, slot.clone(), dispatcher));

        Ok(Self {
            local_addr,
            slot,
            accept_task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn state(&self) -> ConnectionState {
        if self.slot.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Stops accepting and drops the current peer. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.accept_task.abort();
        self.slot.close();
    }
}
