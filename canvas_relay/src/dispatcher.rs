// Broadcast dispatcher: the relay's shared board state and fan-out.
//
// `Dispatcher` is the central data structure that `server.rs` drives. It owns
// the client `Registry` and the board `History`. All mutation happens through
// methods called from the server's single-threaded relay loop, so there is no
// internal locking and no two dispatches ever interleave.
//
// Key responsibilities:
// - Dispatch: apply a message to the history (append on draw, reset on
//   clear), encode it once, and queue it for every registered connection
//   except its origin.
// - Join: register a connection, announce it to everyone (itself included),
//   then replay the history to it alone. Because this runs as one step on the
//   relay loop, a joiner sees the notice, then exactly the history as of its
//   join, then every later dispatch, with nothing duplicated or missed.
// - Leave: deregister a connection. Idempotent.
//
// Delivery failures: a target whose writer has failed (or whose queue is
// closed) is evicted from the registry during the dispatch that notices it.
// The remaining targets are unaffected and the caller never sees the error.

use std::sync::Arc;

use canvas_protocol::framing::encode;
use canvas_protocol::message::Message;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Frame};
use crate::history::History;
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Shared relay state: who is connected and what is on the board.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    history: History,
}

impl Dispatcher {
    pub fn new(history_cap: Option<usize>) -> Self {
        Self {
            registry: Registry::new(),
            history: History::new(history_cap),
        }
    }

    /// Apply `msg` to the board and deliver it to every registered
    /// connection except `origin` (`None` delivers to everyone). Returns the
    /// number of connections it was queued for.
    pub fn dispatch(&mut self, msg: &Message, origin: Option<ConnectionId>) -> usize {
        let frame: Frame = match encode(msg) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!(error = %e, "dropping message that cannot be framed");
                return 0;
            }
        };
        self.history.record(msg);

        let mut delivered = 0;
        let mut failed = Vec::new();
        for conn in self.registry.snapshot() {
            if Some(conn.id()) == origin {
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed.push(conn.id()),
            }
        }
        for id in failed {
            self.evict(id);
        }
        delivered
    }

    /// Register a new connection, announce it, and replay the board to it.
    pub fn join(&mut self, conn: Connection) {
        let id = conn.id();
        let peer = conn.peer();
        if !self.registry.add(conn) {
            warn!(conn = %id, "connection id already registered, ignoring join");
            return;
        }
        info!(conn = %id, %peer, clients = self.registry.len(), "client joined");

        let notice = Message::notice(format!("New user joined from {}", peer.ip()));
        self.dispatch(&notice, None);

        // The notice may already have evicted a connection that died on arrival.
        if self.registry.contains(id) {
            self.replay_to(id);
        }
    }

    /// Deregister a connection. Returns false if it was not registered
    /// (already evicted or never joined).
    pub fn leave(&mut self, id: ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(conn) => {
                info!(
                    conn = %id,
                    peer = %conn.peer(),
                    clients = self.registry.len(),
                    "client left"
                );
                true
            }
            None => false,
        }
    }

    /// Close every connection, including ones whose writer is blocked on a
    /// peer that stopped reading, and empty the registry.
    pub fn shutdown(&mut self) {
        info!(clients = self.registry.len(), "closing all connections");
        for conn in self.registry.snapshot() {
            conn.close();
        }
        self.registry.clear();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Send the full history to one connection only. Bypasses `dispatch` so
    /// nothing is re-recorded or re-broadcast.
    fn replay_to(&mut self, id: ConnectionId) {
        let Some(conn) = self.registry.get(id) else {
            return;
        };
        let mut sent = 0;
        let mut ok = true;
        for msg in self.history.replay() {
            let frame: Frame = match encode(msg) {
                Ok(bytes) => Arc::from(bytes),
                Err(e) => {
                    warn!(conn = %id, error = %e, "skipping unframeable history entry");
                    continue;
                }
            };
            if conn.send(frame).is_err() {
                ok = false;
                break;
            }
            sent += 1;
        }
        debug!(conn = %id, strokes = sent, "replayed board history");
        if !ok {
            self.evict(id);
        }
    }

    fn evict(&mut self, id: ConnectionId) {
        if let Some(conn) = self.registry.remove(id) {
            warn!(conn = %id, peer = %conn.peer(), "delivery failed, evicting client");
            conn.close();
        }
    }
}
