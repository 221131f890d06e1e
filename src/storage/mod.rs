use crate::error::{BittorrentError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tracing::{debug, info};

/// The single output file shared by every peer session.
///
/// Writes are positional, so concurrent writers need no lock as long as they touch disjoint
/// byte ranges, which holds because every piece owns `[index * piece_length, +len)`.
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
    file: Arc<File>,
    piece_length: u64,
}

impl OutputFile {
    /// Open (creating if needed) the output file. With `preallocate`, the file is sized to
    /// `total_length` up front so it is never left sparse by out-of-order writes.
    pub async fn create<P: AsRef<Path>>(
        path: P,
        piece_length: u64,
        total_length: u64,
        preallocate: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&path)
            .await?;

        if preallocate {
            file.set_len(total_length).await?;
        }

        info!(
            "Output file {} opened ({} bytes{})",
            path.display(),
            total_length,
            if preallocate { ", preallocated" } else { "" }
        );

        Ok(Self {
            path,
            file: Arc::new(file.into_std().await),
            piece_length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of piece `index`
    pub fn piece_offset(&self, index: usize) -> u64 {
        index as u64 * self.piece_length
    }

    /// Write a piece at its offset. The blocking write runs off the async workers.
    pub async fn write_piece(&self, index: usize, data: Bytes) -> Result<()> {
        let offset = self.piece_offset(index);
        let file = Arc::clone(&self.file);
        let len = data.len();

        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(|e| BittorrentError::StorageError(format!("Write task failed: {}", e)))??;

        debug!("Wrote piece {} ({} bytes) at offset {}", index, len, offset);
        Ok(())
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_out_of_order_writes() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::create(dir.path().join("out.bin"), 4, 10, false)
            .await
            .unwrap();

        output.write_piece(2, Bytes::from_static(b"ij")).await.unwrap();
        output.write_piece(0, Bytes::from_static(b"abcd")).await.unwrap();
        output.write_piece(1, Bytes::from_static(b"efgh")).await.unwrap();

        let written = std::fs::read(output.path()).unwrap();
        assert_eq!(written, b"abcdefghij");
    }

    #[tokio::test]
    async fn test_preallocate_sets_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");
        let output = OutputFile::create(&path, 16384, 40_000, true).await.unwrap();

        assert_eq!(std::fs::metadata(output.path()).unwrap().len(), 40_000);
        assert_eq!(output.piece_offset(2), 32_768);
    }

    #[tokio::test]
    async fn test_concurrent_disjoint_writes() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::create(dir.path().join("out.bin"), 1024, 8 * 1024, true)
            .await
            .unwrap();

        let writes = (0..8u8).map(|i| {
            let output = output.clone();
            tokio::spawn(async move {
                output
                    .write_piece(i as usize, Bytes::from(vec![i; 1024]))
                    .await
            })
        });
        for handle in writes.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let written = std::fs::read(output.path()).unwrap();
        for (i, chunk) in written.chunks(1024).enumerate() {
            assert!(chunk.iter().all(|&b| b == i as u8));
        }
    }
}
