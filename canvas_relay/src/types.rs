// Core ID types for the relay.
//
// `ConnectionId` is a relay-scoped identifier: the relay thread hands out
// compact integers in accept order and uses them to name connections in the
// registry, in log lines, and in the events its reader threads send to the
// relay loop. It never appears on the wire.

use std::fmt;

/// Relay-assigned connection ID (compact u64, unique for the relay's lifetime).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
