// TCP server and relay event loop.
//
// Architecture: thread-per-reader and thread-per-writer around a single
// relay thread, connected by one `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the relay thread.
//   Accept failures are logged and the loop keeps going.
// - **Relay thread**: owns the `Dispatcher` (registry + history) and handles
//   events one at a time. A new connection gets an ID, a writer thread (see
//   `connection.rs`), its join step (register, notice, replay), and finally a
//   reader thread. Incoming messages are dispatched; disconnects deregister.
// - **Reader threads** (one per client): call `framing::decode()` in a loop
//   and send `InternalEvent::MessageFrom` to the relay thread. A malformed
//   frame is logged and skipped. On EOF or transport error, send
//   `InternalEvent::Disconnected` and exit.
//
// Funnelling every registry and history mutation through the relay thread
// makes join + replay atomic with respect to dispatches, and the per-client
// writer queues keep a slow peer from stalling the loop.
//
// Shutdown: `RelayHandle::stop` clears the `keep_running` flag (checked by
// the listener between accepts) and sends `InternalEvent::Shutdown`, which
// makes the relay thread close every connection and return.

use std::io::{self, BufReader};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use canvas_protocol::error::FrameError;
use canvas_protocol::framing::decode;
use canvas_protocol::message::Message;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::types::ConnectionId;

/// How long the non-blocking accept loop sleeps when no connection is waiting.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Events sent from listener/reader threads to the relay thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
        peer: SocketAddr,
    },
    MessageFrom {
        id: ConnectionId,
        message: Message,
    },
    Disconnected {
        id: ConnectionId,
    },
    Shutdown,
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    events: Sender<InternalEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        let _ = self.events.send(InternalEvent::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Block until the relay thread exits (it only does so after `stop`).
    pub fn wait(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Maximum strokes kept for replay; `None` keeps everything since the
    /// last clear.
    pub max_history: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 65432,
            max_history: None,
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind(SocketAddr::new(config.bind_addr, config.port))?;
    let addr = listener.local_addr()?;
    // Non-blocking so the accept thread can check keep_running periodically.
    listener.set_nonblocking(true)?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::Builder::new()
        .name("canvas-listener".into())
        .spawn(move || accept_loop(listener, tx_listener, keep_running_listener))?;

    let tx_relay = tx.clone();
    let thread = thread::Builder::new()
        .name("canvas-relay".into())
        .spawn(move || run_relay(config, rx, tx_relay))?;

    info!(%addr, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            events: tx,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Listener thread: accept connections until `keep_running` is cleared.
fn accept_loop(listener: TcpListener, tx: Sender<InternalEvent>, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(%peer, error = %e, "could not make stream blocking, dropping");
                    continue;
                }
                stream.set_nodelay(true).ok();
                if tx.send(InternalEvent::NewConnection { stream, peer }).is_err() {
                    break; // Relay thread is gone.
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!("listener stopped");
}

/// Relay loop. Runs until a `Shutdown` event arrives.
fn run_relay(config: RelayConfig, rx: Receiver<InternalEvent>, tx: Sender<InternalEvent>) {
    let mut dispatcher = Dispatcher::new(config.max_history);
    let mut next_id = 0u64;

    while let Ok(event) = rx.recv() {
        match event {
            InternalEvent::NewConnection { stream, peer } => {
                let id = ConnectionId(next_id);
                next_id += 1;
                handle_new_connection(&mut dispatcher, id, stream, peer, &tx);
            }
            InternalEvent::MessageFrom { id, message } => {
                handle_message(&mut dispatcher, id, message);
            }
            InternalEvent::Disconnected { id } => {
                if !dispatcher.leave(id) {
                    debug!(conn = %id, "disconnect for connection already removed");
                }
            }
            InternalEvent::Shutdown => break,
        }
    }

    dispatcher.shutdown();
    info!("relay stopped");
}

/// Handle a new TCP connection: start its writer, run the join step, and
/// spawn its reader thread.
fn handle_new_connection(
    dispatcher: &mut Dispatcher,
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    tx: &Sender<InternalEvent>,
) {
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(conn = %id, %peer, error = %e, "could not clone stream, dropping");
            return;
        }
    };

    let conn = match Connection::open(id, peer, stream) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(conn = %id, %peer, error = %e, "could not start writer, dropping");
            return;
        }
    };
    dispatcher.join(conn);

    let tx_reader = tx.clone();
    let spawned = thread::Builder::new()
        .name(format!("canvas-reader-{}", id.0))
        .spawn(move || reader_loop(BufReader::new(read_stream), id, peer, tx_reader));
    if let Err(e) = spawned {
        warn!(conn = %id, error = %e, "could not start reader, dropping");
        dispatcher.leave(id);
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    id: ConnectionId,
    peer: SocketAddr,
    tx: Sender<InternalEvent>,
) {
    loop {
        match decode(&mut reader) {
            Ok(message) => {
                debug!(conn = %id, ?message, "received");
                if tx.send(InternalEvent::MessageFrom { id, message }).is_err() {
                    return; // Relay thread is gone.
                }
            }
            Err(FrameError::PeerClosed) => {
                debug!(conn = %id, %peer, "peer closed connection");
                break;
            }
            Err(e) if !e.is_fatal() => {
                warn!(conn = %id, %peer, error = %e, "discarding malformed frame");
            }
            Err(e) => {
                debug!(conn = %id, %peer, error = %e, "transport error");
                break;
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { id });
}

/// Handle a decoded client message.
fn handle_message(dispatcher: &mut Dispatcher, id: ConnectionId, message: Message) {
    if message.mutates_board() {
        dispatcher.dispatch(&message, Some(id));
    } else {
        // Notices are relay-originated only.
        warn!(conn = %id, "ignoring system notice sent by a client");
    }
}
