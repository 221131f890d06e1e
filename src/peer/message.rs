use crate::error::{BittorrentError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a declared message length (id byte included). Comfortably fits a 16 KiB
/// block and the bitfield of a torrent with millions of pieces.
pub const MAX_MESSAGE_SIZE: u32 = 1 << 20;

/// Serialized keep-alive: a zero length prefix with no id or payload
pub const KEEP_ALIVE: [u8; 4] = [0; 4];

/// Information about a block within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Piece index
    pub piece_index: u32,
    /// Byte offset within the piece
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// Messages exchanged between peers. Keep-alives are not a variant; they decode to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { block: BlockInfo },
    Piece {
        piece_index: u32,
        offset: u32,
        data: Vec<u8>,
    },
    Cancel { block: BlockInfo },
    /// Any id this client does not act on; kept verbatim
    Other { id: u8, payload: Vec<u8> },
}

impl PeerMessage {
    pub const CHOKE: u8 = 0;
    pub const UNCHOKE: u8 = 1;
    pub const INTERESTED: u8 = 2;
    pub const NOT_INTERESTED: u8 = 3;
    pub const HAVE: u8 = 4;
    pub const BITFIELD: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const PIECE: u8 = 7;
    pub const CANCEL: u8 = 8;

    /// A "request" for `length` bytes at `begin` within piece `index`
    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        PeerMessage::Request {
            block: BlockInfo::new(index, begin, length),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            PeerMessage::Choke => Self::CHOKE,
            PeerMessage::Unchoke => Self::UNCHOKE,
            PeerMessage::Interested => Self::INTERESTED,
            PeerMessage::NotInterested => Self::NOT_INTERESTED,
            PeerMessage::Have { .. } => Self::HAVE,
            PeerMessage::Bitfield { .. } => Self::BITFIELD,
            PeerMessage::Request { .. } => Self::REQUEST,
            PeerMessage::Piece { .. } => Self::PIECE,
            PeerMessage::Cancel { .. } => Self::CANCEL,
            PeerMessage::Other { id, .. } => *id,
        }
    }

    fn put_payload(&self, buf: &mut BytesMut) {
        match self {
            PeerMessage::Choke
            | PeerMessage::Unchoke
            | PeerMessage::Interested
            | PeerMessage::NotInterested => {}
            PeerMessage::Have { piece_index } => buf.put_u32(*piece_index),
            PeerMessage::Bitfield { bitfield } => buf.put_slice(bitfield),
            PeerMessage::Request { block } | PeerMessage::Cancel { block } => {
                buf.put_u32(block.piece_index);
                buf.put_u32(block.offset);
                buf.put_u32(block.length);
            }
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32(*piece_index);
                buf.put_u32(*offset);
                buf.put_slice(data);
            }
            PeerMessage::Other { payload, .. } => buf.put_slice(payload),
        }
    }

    /// Serialize message to bytes
    /// Format: <length prefix><message ID><payload>
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = BytesMut::new();
        self.put_payload(&mut payload);

        let mut buf = BytesMut::with_capacity(5 + payload.len());
        buf.put_u32(1 + payload.len() as u32);
        buf.put_u8(self.id());
        buf.put_slice(&payload);
        buf.to_vec()
    }

    /// Build a message from its id and payload (the bytes after the id)
    pub fn from_parts(id: u8, mut payload: &[u8]) -> Result<Self> {
        let message = match id {
            Self::CHOKE => PeerMessage::Choke,
            Self::UNCHOKE => PeerMessage::Unchoke,
            Self::INTERESTED => PeerMessage::Interested,
            Self::NOT_INTERESTED => PeerMessage::NotInterested,
            Self::HAVE => {
                require(payload, 4, "Have")?;
                PeerMessage::Have {
                    piece_index: payload.get_u32(),
                }
            }
            Self::BITFIELD => PeerMessage::Bitfield {
                bitfield: payload.to_vec(),
            },
            Self::REQUEST | Self::CANCEL => {
                require(payload, 12, "Request")?;
                let block = BlockInfo::new(payload.get_u32(), payload.get_u32(), payload.get_u32());
                if id == Self::REQUEST {
                    PeerMessage::Request { block }
                } else {
                    PeerMessage::Cancel { block }
                }
            }
            Self::PIECE => {
                require(payload, 8, "Piece")?;
                let piece_index = payload.get_u32();
                let offset = payload.get_u32();
                PeerMessage::Piece {
                    piece_index,
                    offset,
                    data: payload.to_vec(),
                }
            }
            _ => PeerMessage::Other {
                id,
                payload: payload.to_vec(),
            },
        };

        Ok(message)
    }

    /// Parse one complete frame. `Ok(None)` is a keep-alive.
    pub fn from_bytes(mut data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 4 {
            return Err(BittorrentError::ProtocolError("Message too short".to_string()));
        }

        let length = data.get_u32();
        if length == 0 {
            return Ok(None);
        }
        check_length(length)?;

        if data.len() < length as usize {
            return Err(BittorrentError::ProtocolError(format!(
                "Incomplete message: {} of {} bytes",
                data.len(),
                length
            )));
        }

        let id = data.get_u8();
        Self::from_parts(id, &data[..length as usize - 1]).map(Some)
    }
}

/// Serialize an optional message; `None` yields the keep-alive frame
pub fn serialize(message: Option<&PeerMessage>) -> Vec<u8> {
    match message {
        Some(message) => message.to_bytes(),
        None => KEEP_ALIVE.to_vec(),
    }
}

fn require(payload: &[u8], len: usize, name: &str) -> Result<()> {
    if payload.len() < len {
        return Err(BittorrentError::ProtocolError(format!(
            "{} payload too short: {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

fn check_length(length: u32) -> Result<()> {
    if length > MAX_MESSAGE_SIZE {
        return Err(BittorrentError::MessageTooLarge {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Read one length-prefixed message. The declared length is checked against
/// `MAX_MESSAGE_SIZE` before the body is allocated.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<PeerMessage>> {
    let length = reader.read_u32().await?;
    if length == 0 {
        return Ok(None);
    }
    check_length(length)?;

    let mut frame = BytesMut::with_capacity(4 + length as usize);
    frame.put_u32(length);
    frame.resize(4 + length as usize, 0);
    reader.read_exact(&mut frame[4..]).await?;

    PeerMessage::from_bytes(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_request() {
        let bytes = PeerMessage::request(5, 16384, 16384).to_bytes();

        assert_eq!(&bytes[..4], &13u32.to_be_bytes());
        assert_eq!(bytes[4], PeerMessage::REQUEST);
        assert_eq!(&bytes[5..9], &5u32.to_be_bytes());
        assert_eq!(&bytes[9..13], &16384u32.to_be_bytes());
        assert_eq!(&bytes[13..17], &16384u32.to_be_bytes());
    }

    #[test]
    fn test_piece_roundtrip() {
        let message = PeerMessage::Piece {
            piece_index: 3,
            offset: 16384,
            data: vec![9, 8, 7],
        };
        let bytes = message.to_bytes();
        assert_eq!(bytes.len(), 4 + 1 + 8 + 3);
        assert_eq!(PeerMessage::from_bytes(&bytes).unwrap(), Some(message));
    }

    #[test]
    fn test_unknown_id_is_kept() {
        let message = PeerMessage::Other {
            id: 20,
            payload: b"d1:md6:ut_pexi1eee".to_vec(),
        };
        let decoded = PeerMessage::from_bytes(&message.to_bytes()).unwrap().unwrap();
        assert_eq!(decoded.id(), 20);
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_keep_alive() {
        assert_eq!(serialize(None), vec![0, 0, 0, 0]);
        assert_eq!(PeerMessage::from_bytes(&[0, 0, 0, 0]).unwrap(), None);
        assert_eq!(serialize(Some(&PeerMessage::Interested)), vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let bytes = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        assert!(matches!(
            PeerMessage::from_bytes(&bytes),
            Err(BittorrentError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_payloads() {
        assert!(PeerMessage::from_parts(PeerMessage::HAVE, &[0, 0]).is_err());
        assert!(PeerMessage::from_parts(PeerMessage::REQUEST, &[0; 11]).is_err());
        assert!(PeerMessage::from_parts(PeerMessage::PIECE, &[0; 7]).is_err());
        assert!(PeerMessage::from_bytes(&[0, 0, 0, 5, 4]).is_err());
    }

    #[tokio::test]
    async fn test_read_message_stream() {
        let mut wire = serialize(None);
        wire.extend(PeerMessage::Have { piece_index: 42 }.to_bytes());
        wire.extend(PeerMessage::Unchoke.to_bytes());
        let mut stream = tokio_test::io::Builder::new().read(&wire).build();

        assert_eq!(read_message(&mut stream).await.unwrap(), None);
        assert_eq!(
            read_message(&mut stream).await.unwrap(),
            Some(PeerMessage::Have { piece_index: 42 })
        );
        assert_eq!(read_message(&mut stream).await.unwrap(), Some(PeerMessage::Unchoke));
    }

    #[tokio::test]
    async fn test_read_message_rejects_before_body() {
        // Only the prefix is scripted: reading a body would hit EOF instead of the size check.
        let prefix = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut stream = tokio_test::io::Builder::new().read(&prefix).build();

        let err = read_message(&mut stream).await.unwrap_err();
        assert!(matches!(err, BittorrentError::MessageTooLarge { .. }));
    }
}
