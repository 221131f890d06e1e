mod bitfield;
mod connection;
mod message;
mod protocol;
mod session;

pub use bitfield::Bitfield;
pub use connection::PeerConnection;
pub use message::PeerMessage;
pub use protocol::Handshake;
pub use session::{run_session, SessionConfig, SessionContext};
