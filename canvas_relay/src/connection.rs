// One participant's live stream endpoint, as seen by the relay.
//
// A `Connection` is the write side of a client socket. It owns an outbound
// queue drained by a dedicated writer thread, so pushing a frame never blocks
// the relay thread: a stalled peer only backs up its own queue. Frames are
// `Arc<[u8]>` so one encoded broadcast is shared by every target.
//
// Liveness: the writer thread clears the `alive` flag the first time a write
// fails and then exits, closing the transport. Any later `send` reports
// `Closed`, which the dispatcher treats as a disconnect (lazy eviction).
//
// Dropping the last clone of a `Connection` closes the queue; the writer
// flushes what is already queued, closes the transport and exits. For TCP
// that shuts the socket down in both directions, which also wakes the
// connection's reader thread with EOF.
//
// A writer blocked in a write to a peer that stopped reading never gets to
// see the closed queue. `close()` handles that case: it marks the connection
// dead and fires the sink's interrupt, which for TCP shuts the socket down
// from a cloned handle so the blocked write fails and the writer exits.
//
// The transport is abstracted behind `FrameSink` so the dispatcher can be
// unit tested with in-memory sinks.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::ConnectionId;

/// A complete encoded frame, shared between all targets of one broadcast.
pub type Frame = Arc<[u8]>;

/// Aborts a sink's in-flight write from another thread.
pub type Interrupt = Arc<dyn Fn() + Send + Sync>;

/// Write half of a connection transport.
pub trait FrameSink: Send + 'static {
    /// Write one complete frame.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Release the transport. Called once, from the writer thread.
    fn close(&mut self);

    /// Handle that makes a blocked `write_frame` fail. Taken once, before
    /// the sink moves to its writer thread.
    fn interrupter(&self) -> Option<Interrupt> {
        None
    }
}

impl FrameSink for TcpStream {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)?;
        self.flush()
    }

    fn close(&mut self) {
        // The peer may already be gone; nothing useful to do on failure.
        let _ = self.shutdown(Shutdown::Both);
    }

    fn interrupter(&self) -> Option<Interrupt> {
        let handle = self.try_clone().ok()?;
        Some(Arc::new(move || {
            let _ = handle.shutdown(Shutdown::Both);
        }))
    }
}

/// The queue behind this connection is closed; the peer is gone.
#[derive(Debug, Error)]
#[error("{0} is closed")]
pub struct Closed(pub ConnectionId);

/// Handle to a connected participant. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    outbox: Sender<Frame>,
    alive: Arc<AtomicBool>,
    interrupt: Option<Interrupt>,
}

impl Connection {
    /// Wrap a transport and spawn its writer thread.
    pub fn open<S: FrameSink>(id: ConnectionId, peer: SocketAddr, sink: S) -> io::Result<Self> {
        let (outbox, queue) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let writer_alive = alive.clone();
        let interrupt = sink.interrupter();
        thread::Builder::new()
            .name(format!("canvas-writer-{}", id.0))
            .spawn(move || writer_loop(id, sink, queue, writer_alive))?;
        Ok(Self {
            id,
            peer,
            outbox,
            alive,
            interrupt,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// False once a write to the transport has failed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue a frame for delivery. Never blocks on the network.
    pub fn send(&self, frame: Frame) -> Result<(), Closed> {
        if !self.is_alive() {
            return Err(Closed(self.id));
        }
        self.outbox.send(frame).map_err(|_| Closed(self.id))
    }

    /// Stop delivering to this connection, even if its writer is stuck in a
    /// write. Frames still queued are discarded.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
        if let Some(interrupt) = &self.interrupt {
            interrupt();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Writer thread: drain the queue into the transport until the queue closes
/// or a write fails.
fn writer_loop<S: FrameSink>(
    id: ConnectionId,
    mut sink: S,
    queue: Receiver<Frame>,
    alive: Arc<AtomicBool>,
) {
    for frame in queue {
        if !alive.load(Ordering::Acquire) {
            break;
        }
        if let Err(e) = sink.write_frame(&frame) {
            warn!(conn = %id, error = %e, "write failed, marking connection dead");
            alive.store(false, Ordering::Release);
            break;
        }
    }
    debug!(conn = %id, "writer finished, closing transport");
    sink.close();
}
