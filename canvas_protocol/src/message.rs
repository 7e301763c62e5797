// Protocol messages exchanged between canvas clients and the relay.
//
// One enum, `Message`, covers the whole vocabulary. The same type flows in
// both directions: clients send `Draw` and `Clear`, the relay forwards them
// and additionally originates `SystemNotice`. Serde's internally tagged
// representation puts the variant name in a `type` field, so the JSON shape
// is flat:
//
//   {"type":"draw","x1":0,"y1":0,"x2":10,"y2":10,"color":"red","width":2}
//   {"type":"clear"}
//   {"type":"system","message":"New user joined from 10.0.0.7"}
//
// Unknown extra fields are ignored. Missing fields, unknown `type` values and
// non-integer coordinates fail deserialization (see `framing::decode`).

use serde::{Deserialize, Serialize};

/// A single board operation or relay notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// One stroke segment from `(x1, y1)` to `(x2, y2)`.
    Draw {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: String,
        width: u32,
    },
    /// Wipe the board.
    Clear,
    /// Human-readable notice originated by the relay.
    #[serde(rename = "system")]
    SystemNotice {
        #[serde(rename = "message")]
        text: String,
    },
}

impl Message {
    /// Convenience constructor for a stroke segment.
    pub fn draw(from: (i32, i32), to: (i32, i32), color: impl Into<String>, width: u32) -> Self {
        Message::Draw {
            x1: from.0,
            y1: from.1,
            x2: to.0,
            y2: to.1,
            color: color.into(),
            width,
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Message::SystemNotice { text: text.into() }
    }

    /// Whether this message changes the board (and so affects history).
    pub fn mutates_board(&self) -> bool {
        matches!(self, Message::Draw { .. } | Message::Clear)
    }
}
