use super::PeerAddress;
use crate::bencode::BencodeValue;
use crate::error::{BittorrentError, Result};
use std::net::IpAddr;

fn tracker_error(msg: impl Into<String>) -> BittorrentError {
    BittorrentError::TrackerError(msg.into())
}

/// Decoded announce response
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    /// Seconds the tracker asks us to wait before re-announcing
    pub interval: u64,
    pub peers: Vec<PeerAddress>,
}

impl TrackerResponse {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(tracker_error("Response must be a dict"));
        }

        if let Some(failure) = value.get(b"failure reason") {
            let reason = failure.as_str().unwrap_or("Unknown failure");
            return Err(tracker_error(reason));
        }

        let interval = value
            .get(b"interval")
            .and_then(|v| v.as_integer())
            .and_then(|i| u64::try_from(i).ok())
            .unwrap_or(0);

        let peers_value = value
            .get(b"peers")
            .ok_or_else(|| tracker_error("Missing 'peers' field"))?;

        let peers = if let Some(compact) = peers_value.as_bytes() {
            PeerAddress::from_compact_list(compact)?
        } else if let Some(list) = peers_value.as_list() {
            parse_peer_list(list)?
        } else {
            return Err(tracker_error("Invalid 'peers' format"));
        };

        Ok(TrackerResponse { interval, peers })
    }
}

/// Non-compact form: a list of `{ip, port}` dictionaries
fn parse_peer_list(list: &[BencodeValue]) -> Result<Vec<PeerAddress>> {
    list.iter()
        .map(|entry| {
            let ip: IpAddr = entry
                .get(b"ip")
                .and_then(|v| v.as_str())
                .ok_or_else(|| tracker_error("Missing peer 'ip'"))?
                .parse()
                .map_err(|_| tracker_error("Invalid peer IP address"))?;

            let port = entry
                .get(b"port")
                .and_then(|v| v.as_integer())
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| tracker_error("Missing or invalid peer 'port'"))?;

            Ok(PeerAddress::new(ip, port))
        })
        .collect()
}
