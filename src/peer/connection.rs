use super::message::{read_message, serialize};
use super::{Handshake, PeerMessage};
use crate::error::{BittorrentError, Result};
use crate::tracker::PeerAddress;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// A handshaken connection to one peer
pub struct PeerConnection<S = TcpStream> {
    addr: PeerAddress,
    stream: S,
    peer_id: [u8; 20],
}

impl PeerConnection<TcpStream> {
    /// Dial the peer within `dial_timeout` and perform the handshake
    pub async fn connect(
        addr: PeerAddress,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        dial_timeout: Duration,
    ) -> Result<Self> {
        debug!("Connecting to peer: {}", addr);

        let stream = timeout(dial_timeout, TcpStream::connect(addr.socket_addr()))
            .await
            .map_err(|_| BittorrentError::Timeout(format!("connecting to {}", addr)))?
            .map_err(|e| BittorrentError::PeerError(format!("Failed to connect to {}: {}", addr, e)))?;

        Self::handshake(addr, stream, info_hash, our_peer_id).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerConnection<S> {
    /// Exchange handshakes over an already-open stream
    pub async fn handshake(
        addr: PeerAddress,
        mut stream: S,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
    ) -> Result<Self> {
        let handshake = Handshake::new(info_hash, our_peer_id);
        stream.write_all(&handshake.to_bytes()).await?;
        debug!("Sent handshake to {}", addr);

        let peer_handshake = Handshake::read_from(&mut stream).await?;
        if peer_handshake.info_hash != info_hash {
            return Err(BittorrentError::HandshakeError(format!(
                "Info hash mismatch from {}",
                addr
            )));
        }

        info!("Handshake complete with peer: {}", addr);

        Ok(Self {
            addr,
            stream,
            peer_id: peer_handshake.peer_id,
        })
    }

    pub async fn send_message(&mut self, message: &PeerMessage) -> Result<()> {
        self.stream.write_all(&serialize(Some(message))).await?;
        debug!("Sent message to {}: {:?}", self.addr, message.id());
        Ok(())
    }

    /// Receive one message; `None` is a keep-alive
    pub async fn receive_message(&mut self) -> Result<Option<PeerMessage>> {
        let message = read_message(&mut self.stream).await?;
        match &message {
            Some(message) => debug!("Received message from {}: id {}", self.addr, message.id()),
            None => debug!("Received keep-alive from {}", self.addr),
        }
        Ok(message)
    }

    /// Receive one message, failing with `Timeout` if nothing arrives within `limit`
    pub async fn receive_message_within(&mut self, limit: Duration) -> Result<Option<PeerMessage>> {
        let addr = self.addr;
        timeout(limit, self.receive_message())
            .await
            .map_err(|_| BittorrentError::Timeout(format!("waiting for a message from {}", addr)))?
    }

    pub fn addr(&self) -> PeerAddress {
        self.addr
    }

    pub fn peer_id(&self) -> &[u8; 20] {
        &self.peer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn addr() -> PeerAddress {
        "127.0.0.1:6881".parse::<std::net::SocketAddr>().unwrap().into()
    }

    #[tokio::test]
    async fn test_handshake_exchange() {
        let ours = Handshake::new([1u8; 20], [2u8; 20]).to_bytes();
        let theirs = Handshake::new([1u8; 20], [9u8; 20]).to_bytes();
        let stream = Builder::new().write(&ours).read(&theirs).build();

        let conn = PeerConnection::handshake(addr(), stream, [1u8; 20], [2u8; 20])
            .await
            .unwrap();
        assert_eq!(conn.peer_id(), &[9u8; 20]);
        assert_eq!(conn.addr(), addr());
    }

    #[tokio::test]
    async fn test_info_hash_mismatch() {
        let ours = Handshake::new([1u8; 20], [2u8; 20]).to_bytes();
        let theirs = Handshake::new([7u8; 20], [9u8; 20]).to_bytes();
        let stream = Builder::new().write(&ours).read(&theirs).build();

        let result = PeerConnection::handshake(addr(), stream, [1u8; 20], [2u8; 20]).await;
        assert!(matches!(result, Err(BittorrentError::HandshakeError(_))));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let ours = Handshake::new([1u8; 20], [2u8; 20]).to_bytes();
        let theirs = Handshake::new([1u8; 20], [9u8; 20]).to_bytes();
        let stream = Builder::new()
            .write(&ours)
            .read(&theirs)
            .wait(Duration::from_millis(200))
            .read(&PeerMessage::Unchoke.to_bytes())
            .build();

        let mut conn = PeerConnection::handshake(addr(), stream, [1u8; 20], [2u8; 20])
            .await
            .unwrap();
        let result = conn.receive_message_within(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BittorrentError::Timeout(_))));

        let message = conn.receive_message().await.unwrap();
        assert_eq!(message, Some(PeerMessage::Unchoke));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        drop(listener);

        let result =
            PeerConnection::connect(local.into(), [0u8; 20], [0u8; 20], Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
