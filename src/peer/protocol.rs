use crate::error::{BittorrentError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// pstrlen + pstr + reserved + info_hash + peer_id
pub const HANDSHAKE_LEN: usize = 1 + 19 + 8 + 20 + 20;

/// Handshake message for peer wire protocol
/// Format: <pstrlen><pstr><reserved><info_hash><peer_id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub pstr: [u8; 19],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            pstr: *PROTOCOL_STRING,
            info_hash,
            peer_id,
        }
    }

    /// Serialize to the fixed 68-byte layout. Reserved bytes are always zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_LEN);
        buf.push(self.pstr.len() as u8);
        buf.extend_from_slice(&self.pstr);
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&self.info_hash);
        buf.extend_from_slice(&self.peer_id);
        buf
    }

    /// Parse a handshake. Only the length byte is validated; reserved bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_LEN {
            return Err(BittorrentError::HandshakeError(format!(
                "Handshake too short: {} of {} bytes",
                data.len(),
                HANDSHAKE_LEN
            )));
        }

        if data[0] as usize != PROTOCOL_STRING.len() {
            return Err(BittorrentError::HandshakeError(format!(
                "Invalid protocol string length {}",
                data[0]
            )));
        }

        let mut pstr = [0u8; 19];
        pstr.copy_from_slice(&data[1..20]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Handshake {
            pstr,
            info_hash,
            peer_id,
        })
    }

    /// Read exactly one handshake from the stream
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HANDSHAKE_LEN];
        reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                BittorrentError::HandshakeError("Connection closed mid-handshake".to_string())
            }
            _ => BittorrentError::IoError(e),
        })?;

        Self::from_bytes(&buf)
    }
}
