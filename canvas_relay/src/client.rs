// TCP client for connecting to the canvas relay.
//
// The protocol half of a canvas participant, with no rendering or input
// handling. Architecture:
// - `connect()` performs the TCP connect on the calling thread, then spawns
//   a background reader thread.
// - The reader thread calls `decode()` in a loop and pushes each `Message`
//   into an `mpsc` channel. Malformed frames are logged and skipped; EOF or a
//   transport error ends the thread, which closes the channel.
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking; `recv_timeout()` waits for the
//   next message.
//
// A front end redraws from the messages it receives and echoes its own
// strokes locally; the relay never sends a participant its own draws.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use canvas_protocol::error::FrameError;
use canvas_protocol::framing::{decode, send};
use canvas_protocol::message::Message;
use tracing::{debug, warn};

/// TCP client for relay communication.
pub struct CanvasClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Message>,
    _reader_thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl CanvasClient {
    /// Connect to a relay and spawn the reader thread.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, FrameError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        let local_addr = stream.local_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::Builder::new()
            .name("canvas-client-reader".into())
            .spawn(move || reader_loop(reader, tx))?;

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
            local_addr,
        })
    }

    /// This client's end of the connection, as the relay sees it.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send any message to the relay.
    pub fn send(&mut self, msg: &Message) -> Result<(), FrameError> {
        send(&mut self.writer, msg)
    }

    /// Send one stroke segment.
    pub fn send_draw(
        &mut self,
        from: (i32, i32),
        to: (i32, i32),
        color: &str,
        width: u32,
    ) -> Result<(), FrameError> {
        self.send(&Message::draw(from, to, color, width))
    }

    /// Ask every participant to wipe the board.
    pub fn send_clear(&mut self) -> Result<(), FrameError> {
        self.send(&Message::Clear)
    }

    /// Drain all queued relay messages (non-blocking).
    pub fn poll(&self) -> Vec<Message> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next relay message. Returns `None` on
    /// timeout or once the connection has closed and the inbox is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Close the connection in both directions.
    pub fn disconnect(self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Reader thread: decode frames in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<Message>) {
    loop {
        match decode(&mut reader) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Client dropped the receiver
                }
            }
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "skipping malformed frame from relay");
            }
            Err(e) => {
                debug!(error = %e, "relay connection ended");
                break;
            }
        }
    }
}
