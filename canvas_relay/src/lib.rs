// canvas_relay: broadcast relay for a shared drawing board.
//
// The relay is a thin hub: it accepts TCP connections from canvas clients,
// forwards every stroke and clear to all other participants, and keeps the
// strokes drawn since the last clear so that a newcomer can be brought up to
// the current board. It never renders anything; all drawing stays on the
// clients.
//
// Module overview:
// - `connection.rs`: A participant's write side: outbound frame queue plus a
//                    writer thread, with a liveness flag.
// - `registry.rs`:   The set of live connections.
// - `history.rs`:    Strokes since the last clear, in order.
// - `dispatcher.rs`: Registry + history, and the join / dispatch / leave
//                    operations that `server.rs` drives.
// - `server.rs`:     TCP listener, reader threads (one per client), and the
//                    relay event loop. Uses `std::net` with a thread-per-reader
//                    architecture and an `mpsc` channel to funnel events into
//                    the single-threaded `Dispatcher`.
// - `types.rs`:      `ConnectionId`, the relay-assigned connection identity.
// - `client.rs`:     Headless `CanvasClient` for tools and tests.
//
// Dependencies: `canvas_protocol` (message types and framing).
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod history;
pub mod registry;
pub mod server;
pub mod types;

pub use client::CanvasClient;
pub use server::{RelayConfig, RelayHandle, start_relay};
