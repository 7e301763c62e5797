// Client registry: the authoritative set of live connections.
//
// Owned by the dispatcher, which lives on the relay thread. Every add,
// remove and snapshot therefore happens on one thread, one operation at a
// time, and needs no lock. A connection is present from the moment its join
// step registers it until its leave step (or a failed delivery) removes it.
//
// `snapshot()` returns cloned handles, so a broadcast can iterate its
// targets while evicting failed ones from the registry without disturbing
// the iteration.

use std::collections::BTreeMap;

use crate::connection::Connection;
use crate::types::ConnectionId;

#[derive(Debug, Default)]
pub struct Registry {
    members: BTreeMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns false (and keeps the existing entry)
    /// if the ID is already registered.
    pub fn add(&mut self, conn: Connection) -> bool {
        if self.members.contains_key(&conn.id()) {
            return false;
        }
        self.members.insert(conn.id(), conn);
        true
    }

    /// Remove a connection. Removing an absent ID is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.members.remove(&id)
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.members.values().cloned().collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.members.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Drop every handle; each writer flushes its queue and closes its
    /// transport.
    pub fn clear(&mut self) {
        self.members.clear();
    }
}
