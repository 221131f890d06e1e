use super::{Bitfield, PeerConnection, PeerMessage};
use crate::download::{Requeue, WorkQueue};
use crate::error::{BittorrentError, Result};
use crate::piece::{verify_and_write, CompletedPiece, PieceAssembler, PieceWork, BLOCK_SIZE};
use crate::storage::OutputFile;
use crate::tracker::PeerAddress;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pause after cycling through the queue without finding a piece the peer has
const DECLINE_BACKOFF: Duration = Duration::from_millis(100);

/// Timeouts applied by each peer session
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Bound on TCP connection setup
    pub dial_timeout: Duration,
    /// Bound on any single wait for a message from the peer, and on how long a session keeps
    /// pulling only pieces its peer lacks
    pub unchoke_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            unchoke_timeout: Duration::from_secs(30),
        }
    }
}

/// Handles a session shares with the rest of the download
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub config: SessionConfig,
    /// Number of pieces in the torrent
    pub num_pieces: usize,
    pub queue: WorkQueue,
    pub results: mpsc::Sender<CompletedPiece>,
    pub output: OutputFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Handshaking,
    AwaitingBitfield,
    InterestSent,
    Choked,
    Unchoked,
    Requesting,
    AwaitingBlock,
    Idle,
    Closed,
}

/// Downloads pieces from a single peer until the work queue runs dry or the peer fails.
///
/// All state here is owned by the session's task; the only shared pieces are the queue, the
/// result channel, and the output file in `SessionContext`.
pub struct PeerSession<S> {
    conn: PeerConnection<S>,
    ctx: SessionContext,
    state: SessionState,
    bitfield: Option<Bitfield>,
    /// Whether the peer is choking us
    peer_choking: bool,
    /// Pieces this peer lacks that we pulled since we last took one it has
    declined: HashSet<usize>,
    /// When the session started cycling through pieces it had already declined
    idle_since: Option<Instant>,
}

/// Dial `addr`, handshake, and serve work items until done. Errors end only this session.
pub async fn run_session(addr: PeerAddress, ctx: SessionContext) -> Result<()> {
    debug!("Session {} state: {:?}", addr, SessionState::Connecting);
    let conn =
        PeerConnection::connect(addr, ctx.info_hash, ctx.peer_id, ctx.config.dial_timeout).await?;

    PeerSession::new(conn, ctx).run().await
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerSession<S> {
    pub fn new(conn: PeerConnection<S>, ctx: SessionContext) -> Self {
        Self {
            conn,
            ctx,
            state: SessionState::Handshaking,
            bitfield: None,
            peer_choking: true,
            declined: HashSet::new(),
            idle_since: None,
        }
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session {} state: {:?} -> {:?}", self.conn.addr(), self.state, state);
            self.state = state;
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.transition(SessionState::Closed);
        result
    }

    async fn serve(&mut self) -> Result<()> {
        debug!(
            "Serving work to {} (client {})",
            self.conn.addr(),
            String::from_utf8_lossy(&self.conn.peer_id()[..8])
        );
        self.discover_capabilities().await?;

        self.conn.send_message(&PeerMessage::Interested).await?;
        self.transition(SessionState::InterestSent);

        loop {
            self.transition(SessionState::Idle);

            let Some(work) = self.ctx.queue.next().await else {
                debug!("Work queue closed, session {} finished", self.conn.addr());
                return Ok(());
            };

            if !self.peer_has(work.index) {
                let cycled = !self.declined.insert(work.index);
                self.requeue(work);

                if !self.can_serve_any() {
                    info!("Peer {} has no pieces of this torrent, closing session", self.conn.addr());
                    return Ok(());
                }
                if cycled {
                    let idle_since = *self.idle_since.get_or_insert_with(Instant::now);
                    if idle_since.elapsed() >= self.ctx.config.unchoke_timeout {
                        info!(
                            "Peer {} has none of the remaining pieces, closing session",
                            self.conn.addr()
                        );
                        return Ok(());
                    }
                    // A piece this peer has may still come back from another session.
                    sleep(DECLINE_BACKOFF).await;
                }
                continue;
            }

            self.declined.clear();
            self.idle_since = None;

            if let Err(e) = self.wait_for_unchoke().await {
                self.requeue(work);
                return Err(e);
            }

            let data = match self.download_piece(&work).await {
                Ok(data) => data,
                Err(e) => {
                    self.requeue(work);
                    return Err(e);
                }
            };

            if let Err(e) = verify_and_write(&work, &data, &self.ctx.output).await {
                if matches!(e, BittorrentError::HashMismatch { .. }) {
                    warn!("Piece {} from {} failed verification", work.index, self.conn.addr());
                } else {
                    error!("Could not store piece {} from {}: {}", work.index, self.conn.addr(), e);
                }
                self.requeue(work);
                // Let a waiting session take the piece before this one pulls again.
                tokio::task::yield_now().await;
                continue;
            }

            let completed = CompletedPiece {
                index: work.index,
                data,
            };
            if self.ctx.results.send(completed).await.is_err() {
                debug!("Result collector gone, session {} finished", self.conn.addr());
                return Ok(());
            }
        }
    }

    /// Read the first message after the handshake and keep it if it is a bitfield
    async fn discover_capabilities(&mut self) -> Result<()> {
        self.transition(SessionState::AwaitingBitfield);

        match self
            .conn
            .receive_message_within(self.ctx.config.unchoke_timeout)
            .await?
        {
            Some(PeerMessage::Bitfield { bitfield }) => {
                let bitfield = Bitfield::new(bitfield);
                debug!("Peer {} advertises {} pieces", self.conn.addr(), bitfield.count());
                self.bitfield = Some(bitfield);
            }
            Some(PeerMessage::Unchoke) => self.peer_choking = false,
            Some(other) => debug!(
                "Peer {} sent id {} instead of a bitfield",
                self.conn.addr(),
                other.id()
            ),
            None => {}
        }

        Ok(())
    }

    /// Without a bitfield we cannot rule the peer out, so it gets a try
    fn peer_has(&self, index: usize) -> bool {
        self.bitfield.as_ref().map_or(true, |bf| bf.has_piece(index))
    }

    fn can_serve_any(&self) -> bool {
        match &self.bitfield {
            Some(bf) => (0..self.ctx.num_pieces).any(|i| bf.has_piece(i)),
            None => true,
        }
    }

    fn requeue(&self, work: PieceWork) {
        let index = work.index;
        match self.ctx.queue.requeue(work) {
            Requeue::Queued => {
                debug!("Requeued piece {} ({} pending)", index, self.ctx.queue.len())
            }
            Requeue::Full => warn!("Work queue full, dropping piece {}", index),
            Requeue::Closed => debug!("Work queue closed, piece {} no longer needed", index),
        }
    }

    async fn wait_for_unchoke(&mut self) -> Result<()> {
        while self.peer_choking {
            self.transition(SessionState::Choked);

            match self
                .conn
                .receive_message_within(self.ctx.config.unchoke_timeout)
                .await?
            {
                Some(PeerMessage::Unchoke) => self.peer_choking = false,
                Some(PeerMessage::Choke) => self.peer_choking = true,
                Some(other) => debug!(
                    "Ignoring id {} from {} while choked",
                    other.id(),
                    self.conn.addr()
                ),
                None => {}
            }
        }

        self.transition(SessionState::Unchoked);
        Ok(())
    }

    /// Request the piece one block at a time, reading one "piece" reply per request
    async fn download_piece(&mut self, work: &PieceWork) -> Result<bytes::Bytes> {
        let mut assembler = PieceAssembler::new(work.index, work.length);
        let index = work.index as u32;

        while !assembler.is_complete() {
            let begin = assembler.accepted() as u32;
            let length = BLOCK_SIZE.min(work.length - begin);

            self.transition(SessionState::Requesting);
            self.conn
                .send_message(&PeerMessage::request(index, begin, length))
                .await?;

            self.transition(SessionState::AwaitingBlock);
            loop {
                match self
                    .conn
                    .receive_message_within(self.ctx.config.unchoke_timeout)
                    .await?
                {
                    Some(PeerMessage::Piece {
                        piece_index,
                        offset,
                        data,
                    }) => {
                        // A dropped block leaves the request outstanding.
                        if assembler.add_block(piece_index, offset, &data) {
                            break;
                        }
                    }
                    Some(PeerMessage::Choke) => {
                        self.peer_choking = true;
                        self.transition(SessionState::Choked);
                        return Err(BittorrentError::Choked { index: work.index });
                    }
                    Some(other) => debug!(
                        "Ignoring id {} from {} while awaiting a block",
                        other.id(),
                        self.conn.addr()
                    ),
                    None => {}
                }
            }
        }

        Ok(assembler.into_bytes())
    }
}
