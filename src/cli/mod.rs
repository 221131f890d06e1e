use crate::client::{ClientConfig, TorrentClient};
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "piecemeal")]
#[command(about = "Download single-file torrents from many peers at once", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a torrent file
    Download {
        /// Path to the .torrent file
        #[arg(short, long)]
        torrent: PathBuf,

        /// Download directory
        #[arg(short, long, default_value = "./downloads")]
        output: String,

        /// Port reported to the tracker
        #[arg(short, long, default_value = "6881")]
        port: u16,

        /// Maximum number of peers to connect to
        #[arg(short, long, default_value = "50")]
        max_peers: usize,

        /// Seconds to wait for a TCP connection to a peer
        #[arg(long, default_value = "5")]
        dial_timeout: u64,

        /// Seconds to wait for any single message from a peer
        #[arg(long, default_value = "30")]
        unchoke_timeout: u64,

        /// Don't size the output file before downloading
        #[arg(long)]
        no_preallocate: bool,
    },

    /// Show information about a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Download {
                torrent,
                output,
                port,
                max_peers,
                dial_timeout,
                unchoke_timeout,
                no_preallocate,
            } => {
                let config = ClientConfig {
                    download_dir: output.clone(),
                    listen_port: *port,
                    max_peers: *max_peers,
                    dial_timeout: Duration::from_secs(*dial_timeout),
                    unchoke_timeout: Duration::from_secs(*unchoke_timeout),
                    preallocate: !no_preallocate,
                };

                let client = TorrentClient::new(config);
                let summary = client.download(torrent).await?;
                println!(
                    "Downloaded {}/{} pieces to {}",
                    summary.completed, summary.total, output
                );
            }

            Commands::Info { torrent } => {
                self.show_torrent_info(torrent).await?;
            }
        }

        Ok(())
    }

    async fn show_torrent_info(&self, torrent_path: &Path) -> Result<()> {
        let metainfo = crate::torrent::load_torrent_file(torrent_path).await?;
        let info = &metainfo.info;

        println!("Torrent Information");
        println!("==================");
        println!("Name: {}", info.name);
        println!("Tracker: {}", metainfo.announce);
        println!("Total Size: {} bytes", info.length);
        println!("Piece Length: {} bytes", info.piece_length);
        println!("Number of Pieces: {}", info.num_pieces());
        println!("Info Hash: {}", metainfo.info_hash_hex());

        Ok(())
    }
}
