use super::PieceWork;
use crate::error::{BittorrentError, Result};
use crate::storage::OutputFile;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

/// Check an assembled piece against its expected SHA-1 digest
pub fn verify_piece(work: &PieceWork, data: &[u8]) -> Result<()> {
    let digest = Sha1::digest(data);

    if digest.as_slice() != work.hash.as_bytes() {
        debug!("Piece {} digest {}", work.index, hex::encode(digest));
        return Err(BittorrentError::HashMismatch { index: work.index });
    }

    Ok(())
}

/// Verify a piece and, only if it matches, write it at its offset in the output file
pub async fn verify_and_write(work: &PieceWork, data: &Bytes, output: &OutputFile) -> Result<()> {
    verify_piece(work, data)?;
    output.write_piece(work.index, data.clone()).await?;

    info!("Piece {} verified and written", work.index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::PieceHash;

    fn sha1(data: &[u8]) -> PieceHash {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&Sha1::digest(data));
        PieceHash::new(hash)
    }

    #[tokio::test]
    async fn test_valid_piece_written_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::create(dir.path().join("out.bin"), 16384, 5 * 16384, false)
            .await
            .unwrap();
        let data = Bytes::from_static(b"test piece data");
        let work = PieceWork::new(5, sha1(&data), data.len() as u32);

        verify_and_write(&work, &data, &output).await.unwrap();

        let written = std::fs::read(output.path()).unwrap();
        assert_eq!(written.len(), 5 * 16384 + data.len());
        assert_eq!(&written[5 * 16384..], &data[..]);
    }

    #[tokio::test]
    async fn test_hash_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::create(dir.path().join("out.bin"), 16384, 16384, false)
            .await
            .unwrap();
        let data = Bytes::from_static(b"test piece data");
        let mut wrong = [0u8; 20];
        wrong[..3].copy_from_slice(&[1, 2, 3]);
        let work = PieceWork::new(0, PieceHash::new(wrong), data.len() as u32);

        let err = verify_and_write(&work, &data, &output).await.unwrap_err();
        assert!(matches!(err, BittorrentError::HashMismatch { index: 0 }));
        assert_eq!(std::fs::metadata(output.path()).unwrap().len(), 0);
    }
}
