use crate::download::{DownloadSummary, Scheduler};
use crate::error::Result;
use crate::peer::SessionConfig;
use crate::storage::OutputFile;
use crate::torrent::Metainfo;
use crate::tracker::{generate_peer_id, PeerAddress, TrackerClient, TrackerRequest};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration for the BitTorrent client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub download_dir: String,
    /// Port reported to the tracker
    pub listen_port: u16,
    pub max_peers: usize,
    pub dial_timeout: Duration,
    pub unchoke_timeout: Duration,
    /// Size the output file to its final length before downloading
    pub preallocate: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            download_dir: "./downloads".to_string(),
            listen_port: 6881,
            max_peers: 50,
            dial_timeout: session.dial_timeout,
            unchoke_timeout: session.unchoke_timeout,
            preallocate: true,
        }
    }
}

impl ClientConfig {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            dial_timeout: self.dial_timeout,
            unchoke_timeout: self.unchoke_timeout,
        }
    }
}

/// Main BitTorrent client
pub struct TorrentClient {
    config: ClientConfig,
    peer_id: [u8; 20],
}

impl TorrentClient {
    pub fn new(config: ClientConfig) -> Self {
        let peer_id = generate_peer_id();
        info!("Client initialized with peer_id: {}", hex::encode(peer_id));

        Self { config, peer_id }
    }

    /// Download a torrent into the configured directory
    pub async fn download(&self, torrent_path: &Path) -> Result<DownloadSummary> {
        info!("Starting download for: {}", torrent_path.display());

        let metainfo = crate::torrent::load_torrent_file(torrent_path).await?;

        info!("Torrent: {}", metainfo.info.name);
        info!("Total size: {} bytes", metainfo.info.length);
        info!("Pieces: {}", metainfo.info.num_pieces());
        info!("Info hash: {}", metainfo.info_hash_hex());

        let peers = self.find_peers(&metainfo).await?;
        self.download_from(&metainfo, &peers).await
    }

    /// Ask the tracker for peers, capped at `max_peers`
    async fn find_peers(&self, metainfo: &Metainfo) -> Result<Vec<PeerAddress>> {
        let tracker_client = TrackerClient::new()?;
        let request = TrackerRequest::new(
            metainfo.info_hash,
            self.peer_id,
            self.config.listen_port,
            metainfo.info.length,
        );

        let mut peers = tracker_client.announce(&metainfo.announce, &request).await?.peers;
        if peers.len() > self.config.max_peers {
            info!(
                "Using {} of {} peers from tracker",
                self.config.max_peers,
                peers.len()
            );
            peers.truncate(self.config.max_peers);
        }

        Ok(peers)
    }

    async fn download_from(&self, metainfo: &Metainfo, peers: &[PeerAddress]) -> Result<DownloadSummary> {
        let info = &metainfo.info;
        let output = OutputFile::create(
            self.output_path(metainfo),
            info.piece_length,
            info.length,
            self.config.preallocate,
        )
        .await?;

        let scheduler = Scheduler::new(
            metainfo.info_hash,
            self.peer_id,
            info.clone(),
            self.config.session_config(),
        );
        scheduler.run(peers, output).await
    }

    fn output_path(&self, metainfo: &Metainfo) -> PathBuf {
        Path::new(&self.config.download_dir).join(&metainfo.info.name)
    }
}

impl Default for TorrentClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, BencodeValue};
    use crate::peer::{Handshake, PeerMessage};
    use sha1::{Digest, Sha1};
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn torrent_bytes(announce: &str, data: &[u8]) -> (Vec<u8>, [u8; 20]) {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), BencodeValue::from("payload.bin"));
        info.insert(b"length".to_vec(), BencodeValue::from(data.len() as i64));
        info.insert(b"piece length".to_vec(), BencodeValue::from(16384i64));
        let hashes: Vec<u8> = data.chunks(16384).flat_map(|c| Sha1::digest(c).to_vec()).collect();
        info.insert(b"pieces".to_vec(), BencodeValue::from(hashes));
        let info = BencodeValue::Dict(info);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&Sha1::digest(encode(&info)));

        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), BencodeValue::from(announce));
        root.insert(b"info".to_vec(), info);
        (encode(&BencodeValue::Dict(root)), info_hash)
    }

    /// Answer one announce with a compact peer list naming `peer`
    async fn serve_tracker(listener: TcpListener, peer: SocketAddr) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            request.extend_from_slice(&buf[..n]);
        }

        let SocketAddr::V4(v4) = peer else {
            panic!("expected an IPv4 peer");
        };
        let mut compact = v4.ip().octets().to_vec();
        compact.extend_from_slice(&v4.port().to_be_bytes());

        let mut dict = BTreeMap::new();
        dict.insert(b"interval".to_vec(), BencodeValue::from(900i64));
        dict.insert(b"peers".to_vec(), BencodeValue::from(compact));
        let body = encode(&BencodeValue::Dict(dict));

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();

        String::from_utf8_lossy(&request).into_owned()
    }

    /// Seed every piece of `data`, one block per request
    async fn serve_peer(listener: TcpListener, info_hash: [u8; 20], data: Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut theirs = [0u8; 68];
        stream.read_exact(&mut theirs).await.unwrap();
        assert_eq!(&theirs[28..48], &info_hash);
        stream
            .write_all(&Handshake::new(info_hash, [0x33; 20]).to_bytes())
            .await
            .unwrap();
        stream
            .write_all(&PeerMessage::Unchoke.to_bytes())
            .await
            .unwrap();

        loop {
            let Ok(len) = stream.read_u32().await else {
                return;
            };
            let mut body = vec![0u8; len as usize];
            stream.read_exact(&mut body).await.unwrap();
            if body.first() != Some(&PeerMessage::REQUEST) {
                continue;
            }

            let index = u32::from_be_bytes(body[1..5].try_into().unwrap());
            let begin = u32::from_be_bytes(body[5..9].try_into().unwrap());
            let length = u32::from_be_bytes(body[9..13].try_into().unwrap());
            let start = index as usize * 16384 + begin as usize;
            let reply = PeerMessage::Piece {
                piece_index: index,
                offset: begin,
                data: data[start..start + length as usize].to_vec(),
            };
            if stream.write_all(&reply.to_bytes()).await.is_err() {
                return;
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.download_dir, "./downloads");
        assert_eq!(config.listen_port, 6881);
        assert_eq!(config.max_peers, 50);
        assert!(config.preallocate);

        let session = config.session_config();
        assert_eq!(session.dial_timeout, Duration::from_secs(5));
        assert_eq!(session.unchoke_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_download_through_tracker() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();

        let tracker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let seeder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let announce = format!("http://{}/announce", tracker.local_addr().unwrap());
        let seeder_addr = seeder.local_addr().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (torrent, info_hash) = torrent_bytes(&announce, &data);
        let torrent_path = dir.path().join("payload.torrent");
        std::fs::write(&torrent_path, torrent).unwrap();

        let tracker_task = tokio::spawn(serve_tracker(tracker, seeder_addr));
        let seeder_task = tokio::spawn(serve_peer(seeder, info_hash, data.clone()));

        let download_dir = dir.path().join("out");
        let client = TorrentClient::new(ClientConfig {
            download_dir: download_dir.to_string_lossy().into_owned(),
            ..ClientConfig::default()
        });

        let summary = client.download(&torrent_path).await.unwrap();
        assert_eq!(summary, DownloadSummary { completed: 3, total: 3 });
        assert_eq!(std::fs::read(download_dir.join("payload.bin")).unwrap(), data);

        let request = tracker_task.await.unwrap();
        assert!(request.contains("compact=1"));
        assert!(request.contains("left=40000"));
        assert!(request.contains("port=6881"));
        seeder_task.abort();
    }

    #[tokio::test]
    async fn test_peer_list_is_capped() {
        let tracker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let announce = format!("http://{}/announce", tracker.local_addr().unwrap());
        let peer: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let tracker_task = tokio::spawn(serve_tracker(tracker, peer));

        let (torrent, _) = torrent_bytes(&announce, &[0u8; 100]);
        let metainfo = crate::torrent::parse_torrent(&torrent).unwrap();

        let client = TorrentClient::new(ClientConfig {
            max_peers: 0,
            ..ClientConfig::default()
        });
        let peers = client.find_peers(&metainfo).await.unwrap();
        assert!(peers.is_empty());
        tracker_task.await.unwrap();
    }
}
