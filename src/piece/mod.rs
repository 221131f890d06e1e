mod assembler;
mod verify;

pub use assembler::PieceAssembler;
pub use verify::verify_and_write;

use crate::torrent::PieceHash;
use bytes::Bytes;

/// Maximum block size requested from a peer (16 KiB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// One piece waiting to be downloaded. Exactly one session holds a given item at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    pub index: usize,
    pub hash: PieceHash,
    /// Actual length of this piece (the last one may be short)
    pub length: u32,
}

impl PieceWork {
    pub fn new(index: usize, hash: PieceHash, length: u32) -> Self {
        Self {
            index,
            hash,
            length,
        }
    }
}

/// A verified piece, already written to the output file
#[derive(Debug, Clone)]
pub struct CompletedPiece {
    pub index: usize,
    pub data: Bytes,
}
