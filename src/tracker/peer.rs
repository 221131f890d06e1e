use crate::error::{BittorrentError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Address of a candidate peer, as handed out by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Parse one compact peer entry (4 bytes IPv4 + 2 bytes big-endian port)
    pub fn from_compact(data: &[u8; 6]) -> Self {
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        Self::new(IpAddr::V4(ip), port)
    }

    /// Parse a compact peer list. The length must be a multiple of 6.
    pub fn from_compact_list(data: &[u8]) -> Result<Vec<Self>> {
        if data.len() % 6 != 0 {
            return Err(BittorrentError::TrackerError(format!(
                "Compact peer list length {} is not a multiple of 6",
                data.len()
            )));
        }

        Ok(data
            .chunks_exact(6)
            .filter_map(|chunk| <&[u8; 6]>::try_from(chunk).ok())
            .map(Self::from_compact)
            .collect())
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}
