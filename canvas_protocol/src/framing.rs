// Length-delimited message framing over a byte stream.
//
// Wire format: a 4-byte big-endian length prefix followed by that many bytes
// of UTF-8 JSON (see `message.rs` for the JSON shape). Two layers:
// - `write_frame` / `read_frame` move raw payload bytes and know nothing
//   about JSON.
// - `encode` / `decode` / `send` add the `Message` serialization on
//   top. `encode` produces a complete frame in one buffer so the relay can
//   serialize once and hand the same bytes to every target.
//
// A `MAX_FRAME_SIZE` constant (16 MB) protects against unbounded allocation
// from malformed or malicious length prefixes. An oversized incoming frame is
// skipped without buffering it, so the stream stays aligned and the error is
// reported as `Malformed` rather than killing the connection.

use std::io::{self, Read, Write};

use crate::error::FrameError;
use crate::message::Message;

/// Maximum allowed frame payload size (16 MB). Stroke segments are tiny; this
/// only exists to bound allocation on a hostile length prefix.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Write a length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = checked_len(payload)?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited frame: 4-byte big-endian length, then payload.
///
/// Returns `PeerClosed` if the stream ends before or during a frame. Returns
/// `Malformed` (after discarding the body) if the length exceeds
/// `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        let skipped = io::copy(&mut reader.by_ref().take(u64::from(len)), &mut io::sink())?;
        if skipped < u64::from(len) {
            return Err(FrameError::PeerClosed);
        }
        return Err(FrameError::Malformed {
            reason: format!("length prefix {len} exceeds max {MAX_FRAME_SIZE}"),
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serialize a message into a complete frame (prefix included).
pub fn encode(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let json = serde_json::to_vec(msg)?;
    let len = checked_len(&json)?;
    let mut frame = Vec::with_capacity(4 + json.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Parse a frame payload (without its prefix) into a message.
pub fn decode_payload(payload: &[u8]) -> Result<Message, FrameError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Block until one full frame has been read, then parse it.
pub fn decode<R: Read>(reader: &mut R) -> Result<Message, FrameError> {
    let payload = read_frame(reader)?;
    decode_payload(&payload)
}

/// Encode and write one message, flushing the writer.
pub fn send<W: Write>(writer: &mut W, msg: &Message) -> Result<(), FrameError> {
    let frame = encode(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

fn checked_len(payload: &[u8]) -> Result<u32, FrameError> {
    match u32::try_from(payload.len()) {
        Ok(len) if len <= MAX_FRAME_SIZE => Ok(len),
        _ => Err(FrameError::TooLarge { len: payload.len() }),
    }
}
