mod client;
mod peer;
mod request;
mod response;

pub use client::TrackerClient;
pub use peer::PeerAddress;
pub use request::TrackerRequest;
pub use response::TrackerResponse;

use rand::Rng;

/// Generate a random peer ID
/// Format: -PM0001-<12 random bytes>
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[0..8].copy_from_slice(b"-PM0001-");
    rand::thread_rng().fill(&mut peer_id[8..]);
    peer_id
}
