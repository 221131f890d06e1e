/// Announce parameters for a single tracker round trip
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    /// Number of bytes left to download
    pub left: u64,
}

impl TrackerRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            left,
        }
    }

    /// Query string for the announce GET. The binary fields are percent-encoded byte-wise
    /// because they are not valid UTF-8 in general.
    pub fn to_query_string(&self) -> String {
        let params = [
            ("info_hash", percent_encode(&self.info_hash)),
            ("peer_id", percent_encode(&self.peer_id)),
            ("port", self.port.to_string()),
            ("uploaded", "0".to_string()),
            ("downloaded", "0".to_string()),
            ("compact", "1".to_string()),
            ("left", self.left.to_string()),
        ];

        params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn percent_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
