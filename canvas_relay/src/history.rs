// Board history: the ordered log of strokes since the last clear.
//
// Replaying the entries in order onto an empty board reproduces the current
// board. Only `Draw` messages are stored; a `Clear` empties the log instead
// of being recorded, and system notices never touch it.
//
// Growth is unbounded by default. An optional cap drops the oldest strokes
// once exceeded, trading exact replay for bounded memory; the first overflow
// after each reset is logged.

use std::collections::VecDeque;

use canvas_protocol::message::Message;
use tracing::warn;

#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<Message>,
    cap: Option<usize>,
    overflowed: bool,
}

impl History {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
            overflowed: false,
        }
    }

    /// Apply a message's effect on the board. Returns true if the history
    /// changed.
    pub fn record(&mut self, msg: &Message) -> bool {
        match msg {
            Message::Draw { .. } => {
                self.append(msg.clone());
                true
            }
            Message::Clear => {
                self.reset();
                true
            }
            Message::SystemNotice { .. } => false,
        }
    }

    /// Append a stroke. Non-draw messages are ignored.
    pub fn append(&mut self, msg: Message) {
        if !matches!(msg, Message::Draw { .. }) {
            return;
        }
        self.entries.push_back(msg);
        let Some(cap) = self.cap else {
            return;
        };
        if self.entries.len() <= cap {
            return;
        }
        if !self.overflowed {
            warn!(cap, "board history cap reached, dropping oldest strokes");
            self.overflowed = true;
        }
        while self.entries.len() > cap {
            self.entries.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.overflowed = false;
    }

    /// Every stored stroke, oldest first.
    pub fn replay(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
