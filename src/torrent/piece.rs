use crate::error::{BittorrentError, Result};

/// Expected SHA-1 digest of one piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceHash([u8; 20]);

impl PieceHash {
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let hash: [u8; 20] = slice.try_into().map_err(|_| {
            BittorrentError::InvalidTorrent(format!(
                "Piece hash must be 20 bytes, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl AsRef<[u8]> for PieceHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Ordered piece digests, one per piece index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pieces {
    hashes: Vec<PieceHash>,
}

impl Pieces {
    pub fn new(hashes: Vec<PieceHash>) -> Self {
        Self { hashes }
    }

    /// Split the concatenated `pieces` string of a descriptor into 20-byte digests
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() % 20 != 0 {
            return Err(BittorrentError::InvalidTorrent(format!(
                "Pieces length {} is not a multiple of 20",
                data.len()
            )));
        }

        let hashes = data
            .chunks_exact(20)
            .map(PieceHash::from_slice)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { hashes })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PieceHash> {
        self.hashes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pieces() {
        let mut raw = vec![1u8; 20];
        raw.extend_from_slice(&[2u8; 20]);

        let pieces = Pieces::from_bytes(&raw).unwrap();
        assert_eq!(pieces.len(), 2);
        let hashes: Vec<_> = pieces.iter().collect();
        assert_eq!(hashes[1].as_bytes(), &[2u8; 20]);
    }

    #[test]
    fn test_rejects_truncated_pieces() {
        assert!(Pieces::from_bytes(&[0u8; 21]).is_err());
        assert!(PieceHash::from_slice(&[0u8; 19]).is_err());
    }
}
