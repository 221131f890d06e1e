use super::WorkQueue;
use crate::error::{BittorrentError, Result};
use crate::peer::{run_session, SessionConfig, SessionContext};
use crate::piece::{CompletedPiece, PieceWork};
use crate::storage::OutputFile;
use crate::torrent::TorrentInfo;
use crate::tracker::PeerAddress;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of a finished download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub completed: usize,
    pub total: usize,
}

/// Hands pieces out to one session per peer and collects the verified results
pub struct Scheduler {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    info: TorrentInfo,
    config: SessionConfig,
}

impl Scheduler {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], info: TorrentInfo, config: SessionConfig) -> Self {
        Self {
            info_hash,
            peer_id,
            info,
            config,
        }
    }

    /// One work item per piece, in index order
    fn work_items(&self) -> Result<Vec<PieceWork>> {
        self.info
            .pieces
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                let length = u32::try_from(self.info.piece_size(index)).map_err(|_| {
                    BittorrentError::InvalidTorrent(format!("Piece {} is too large", index))
                })?;
                Ok(PieceWork::new(index, *hash, length))
            })
            .collect()
    }

    /// Download every piece from `peers` into `output`.
    ///
    /// Fails with `IncompleteDownload` if every session exits before all pieces are verified.
    pub async fn run(&self, peers: &[PeerAddress], output: OutputFile) -> Result<DownloadSummary> {
        if self.info.pieces.is_empty() {
            return Ok(DownloadSummary { completed: 0, total: 0 });
        }

        let items = self.work_items()?;
        let total = items.len();
        if peers.is_empty() {
            return Err(BittorrentError::NoPeers { total });
        }

        // Twice the piece count so a requeue rarely finds the queue full.
        let queue = WorkQueue::with_capacity(total * 2);
        for item in items {
            queue.requeue(item);
        }

        let (results_tx, mut results) = mpsc::channel::<CompletedPiece>(total);

        let mut sessions = JoinSet::new();
        for &addr in peers {
            let ctx = SessionContext {
                info_hash: self.info_hash,
                peer_id: self.peer_id,
                config: self.config,
                num_pieces: total,
                queue: queue.clone(),
                results: results_tx.clone(),
                output: output.clone(),
            };
            sessions.spawn(async move { (addr, run_session(addr, ctx).await) });
        }

        info!("Started {} peer sessions for {} pieces", peers.len(), total);

        // The result stream closes once this last sender is dropped, after every session ends.
        tokio::spawn(async move {
            let _results_tx = results_tx;
            while let Some(joined) = sessions.join_next().await {
                match joined {
                    Ok((addr, Ok(()))) => debug!("Session with {} finished", addr),
                    Ok((addr, Err(e))) => debug!("Session with {} ended: {}", addr, e),
                    Err(e) => warn!("Peer session task failed: {}", e),
                }
            }
            debug!("All peer sessions have exited");
        });

        let mut done = vec![false; total];
        let mut completed = 0;

        while completed < total {
            let Some(piece) = results.recv().await else {
                break;
            };
            if std::mem::replace(&mut done[piece.index], true) {
                continue;
            }
            completed += 1;

            let percent = completed as f64 / total as f64 * 100.0;
            info!(
                "Downloaded piece {} ({} bytes, {}/{} pieces, {:.2}%)",
                piece.index,
                piece.data.len(),
                completed,
                total,
                percent
            );
        }

        // Lets sessions still waiting on the queue exit their loop.
        queue.close();
        if !queue.is_empty() {
            debug!("{} pieces left in the work queue", queue.len());
        }

        if completed < total {
            return Err(BittorrentError::IncompleteDownload { completed, total });
        }

        info!("Download complete: {}", output.path().display());
        Ok(DownloadSummary { completed, total })
    }
}
