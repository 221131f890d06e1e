mod bencode;
mod cli;
mod client;
mod download;
mod error;
mod peer;
mod piece;
mod storage;
mod torrent;
mod tracker;

use anyhow::Result;
use cli::Cli;
use tracing_subscriber::EnvFilter;

/// Log this crate at `info` unless `RUST_LOG` says otherwise
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(concat!(env!("CARGO_PKG_NAME"), "=info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    Cli::parse().run().await?;
    Ok(())
}
