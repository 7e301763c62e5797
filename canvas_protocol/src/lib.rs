// canvas_protocol: wire protocol for the shared canvas relay.
//
// This crate defines the message type, framing, and error taxonomy used by
// the relay (`canvas_relay`) and canvas clients to talk over TCP. It is
// shared between both sides and has no networking or threading of its own.
//
// Module overview:
// - `message.rs`:  The `Message` enum (`Draw`, `Clear`, `SystemNotice`) and
//                  its flat JSON representation.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
// - `error.rs`:    `FrameError`, classifying failures as fatal
//                  (`PeerClosed`, `Transport`) or per-frame (`Malformed`).
//
// Design decisions:
// - **JSON serialization.** The board protocol is JSON on the wire, so
//   clients in any language can speak it with a JSON library and a socket.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking TCP streams and buffered wrappers.

pub mod error;
pub mod framing;
pub mod message;

pub use error::FrameError;
pub use framing::{MAX_FRAME_SIZE, decode, decode_payload, encode, read_frame, send, write_frame};
pub use message::Message;
