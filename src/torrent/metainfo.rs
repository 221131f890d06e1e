use super::Pieces;
use crate::bencode::{encode, BencodeValue};
use crate::error::{BittorrentError, Result};
use sha1::{Digest, Sha1};

fn invalid(msg: impl Into<String>) -> BittorrentError {
    BittorrentError::InvalidTorrent(msg.into())
}

fn required_int(dict: &BencodeValue, key: &str) -> Result<u64> {
    let value = dict
        .get(key.as_bytes())
        .and_then(|v| v.as_integer())
        .ok_or_else(|| invalid(format!("Missing '{}' field", key)))?;

    u64::try_from(value).map_err(|_| invalid(format!("Negative '{}' field", key)))
}

/// The `info` section of a single-file torrent
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Output file name
    pub name: String,
    /// Nominal length of every piece but the last
    pub piece_length: u64,
    /// Expected digest of each piece
    pub pieces: Pieces,
    /// Total content length in bytes
    pub length: u64,
}

impl TorrentInfo {
    fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(invalid("Info must be a dict"));
        }
        if value.get(b"files").is_some() {
            return Err(invalid("Multi-file torrents are not supported"));
        }

        let name_bytes = value
            .get(b"name")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| invalid("Missing 'name' field"))?;
        let name = String::from_utf8(name_bytes.to_vec())?;

        let piece_length = required_int(value, "piece length")?;
        let length = required_int(value, "length")?;

        let pieces_bytes = value
            .get(b"pieces")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| invalid("Missing 'pieces' field"))?;
        let pieces = Pieces::from_bytes(pieces_bytes)?;

        let info = TorrentInfo {
            name,
            piece_length,
            pieces,
            length,
        };
        info.validate()?;

        Ok(info)
    }

    /// Check that the piece count covers the total length exactly
    pub fn validate(&self) -> Result<()> {
        if self.piece_length == 0 {
            return Err(invalid("'piece length' must be positive"));
        }
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name == ".." {
            return Err(invalid(format!("Unsafe file name '{}'", self.name)));
        }

        let expected = self.length.div_ceil(self.piece_length);
        if self.pieces.len() as u64 != expected {
            return Err(invalid(format!(
                "{} piece hashes for {} bytes at {} bytes per piece (expected {})",
                self.pieces.len(),
                self.length,
                self.piece_length,
                expected
            )));
        }

        Ok(())
    }

    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// Actual length of piece `index`; the last piece holds the remainder
    pub fn piece_size(&self, index: usize) -> u64 {
        let begin = index as u64 * self.piece_length;
        let end = (begin + self.piece_length).min(self.length);
        end.saturating_sub(begin)
    }
}

/// A decoded `.torrent` descriptor
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// Tracker announce URL
    pub announce: String,
    pub info: TorrentInfo,
    /// SHA-1 of the canonical encoding of the info dictionary
    pub info_hash: [u8; 20],
}

impl Metainfo {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(invalid("Torrent must be a dict"));
        }

        let announce = value
            .get(b"announce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("Missing 'announce' field"))?
            .to_string();

        let info_value = value
            .get(b"info")
            .ok_or_else(|| invalid("Missing 'info' field"))?;

        let info = TorrentInfo::from_bencode(info_value)?;
        let info_hash = calculate_info_hash(info_value);

        Ok(Metainfo {
            announce,
            info,
            info_hash,
        })
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

fn calculate_info_hash(info: &BencodeValue) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(encode(info));

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&hasher.finalize());
    hash
}
