//! Scripted simulation server.
//!
//! Serves the lookup catalog (`/scenarios`, `/agents`, `/models`) and a
//! `/ws/simulation` websocket that answers `START_SIM` with a scripted
//! two-agent conversation, an evaluation, and `END_SIM`.
//!
//! Run:
//!   cargo run -p socialstream-demo-sim-server -- --port 8800 --turns 8

mod script;
mod server;

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sim-server", about = "Scripted SocialStream simulation server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "SIM_SERVER_PORT", default_value_t = 8800)]
    port: u16,

    /// Token clients must pass as `?token=`.
    #[arg(long, env = "SOCIALSTREAM_TOKEN", default_value = "demo-token")]
    token: String,

    /// Agent turns per episode.
    #[arg(long, default_value_t = 6)]
    turns: usize,

    /// Milliseconds between streamed turns.
    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sim_server=info".parse()?))
        .init();

    let args = Args::parse();
    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();

    tracing::info!("Starting simulation server on {} ({} turns per episode)", addr, args.turns);

    server::run(
        addr,
        server::Settings {
            token: args.token,
            turns: args.turns,
            interval: Duration::from_millis(args.interval_ms),
        },
    )
    .await
}
