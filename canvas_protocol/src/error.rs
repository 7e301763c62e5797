// Error type for the frame codec.
//
// The relay treats the variants very differently, so callers match on them
// rather than on `io::ErrorKind`:
// - `PeerClosed` and `Transport` end the connection they occurred on.
// - `Malformed` drops one frame; the stream is still aligned on the next
//   length prefix and the connection keeps going.
// - `TooLarge` is a local refusal to emit a frame; nothing was written.

use std::io;

use thiserror::Error;

use crate::framing::MAX_FRAME_SIZE;

#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream reached EOF before or inside a frame.
    #[error("peer closed the connection")]
    PeerClosed,
    /// The frame body was consumed but is not a recognized message.
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },
    /// Refused to write a payload above the frame size limit.
    #[error("frame too large: {len} bytes (max {max})", max = MAX_FRAME_SIZE)]
    TooLarge { len: usize },
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}

impl FrameError {
    /// True if the connection cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            FrameError::PeerClosed | FrameError::Transport(_) => true,
            FrameError::Malformed { .. } | FrameError::TooLarge { .. } => false,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FrameError::PeerClosed,
            _ => FrameError::Transport(err),
        }
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        FrameError::Malformed {
            reason: err.to_string(),
        }
    }
}
