use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Collects the blocks of one piece into a piece-sized buffer.
///
/// Completion is tracked by the number of bytes accepted, not by which ranges were filled:
/// a peer that sends the same in-bounds block twice can make the piece look complete with
/// gaps. Hash verification is what catches that case.
#[derive(Debug)]
pub struct PieceAssembler {
    index: usize,
    buf: BytesMut,
    accepted: u64,
}

impl PieceAssembler {
    pub fn new(index: usize, length: u32) -> Self {
        Self {
            index,
            buf: BytesMut::zeroed(length as usize),
            accepted: 0,
        }
    }

    /// Copy `block` into the buffer at `begin`. Blocks for another piece, or that would run past
    /// the end of the buffer, are dropped and `false` is returned.
    pub fn add_block(&mut self, piece_index: u32, begin: u32, block: &[u8]) -> bool {
        if piece_index as usize != self.index {
            debug!(
                "Dropping block for piece {} while assembling piece {}",
                piece_index, self.index
            );
            return false;
        }

        let begin = begin as usize;
        let end = match begin.checked_add(block.len()) {
            Some(end) if end <= self.buf.len() => end,
            _ => {
                debug!(
                    "Dropping out-of-bounds block at {} (+{}) for piece {} of {} bytes",
                    begin,
                    block.len(),
                    self.index,
                    self.buf.len()
                );
                return false;
            }
        };

        self.buf[begin..end].copy_from_slice(block);
        self.accepted += block.len() as u64;
        true
    }

    /// Bytes accepted so far; also the offset of the next sequential request
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn is_complete(&self) -> bool {
        self.accepted >= self.buf.len() as u64
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
