// CLI entry point for the canvas relay.
//
// Starts a standalone relay that canvas clients connect to. The relay
// forwards board operations and replays history to newcomers; it never
// renders. See `server.rs` for the networking architecture and
// `dispatcher.rs` for the shared board state.
//
// Usage:
//   relay [OPTIONS]
//     --bind <ADDR>           Interface to listen on (default: 0.0.0.0)
//     --port <PORT>           Listen port (default: 65432)
//     --max-history <N>       Cap on strokes kept for replay (default: unbounded)
//
// Log output is controlled with `RUST_LOG` (default: info for the relay).
// The relay runs until the process is killed.

use std::net::IpAddr;

use canvas_relay::server::{RelayConfig, start_relay};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Shared canvas broadcast relay")]
struct Args {
    /// Interface to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Listen port.
    #[arg(long, default_value_t = 65432)]
    port: u16,

    /// Keep at most this many strokes for replay to new participants.
    #[arg(long, value_name = "N")]
    max_history: Option<usize>,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        RelayConfig {
            bind_addr: args.bind,
            port: args.port,
            max_history: args.max_history,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas_relay=info,canvas_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from(Args::parse());

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "failed to start relay");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");
    handle.wait();
}
