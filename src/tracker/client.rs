use super::{TrackerRequest, TrackerResponse};
use crate::bencode::decode;
use crate::error::{BittorrentError, Result};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for communicating with BitTorrent trackers
pub struct TrackerClient {
    client: Client,
}

impl TrackerClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(ANNOUNCE_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Send a request to a tracker and get the peer list
    pub async fn announce(&self, tracker_url: &str, request: &TrackerRequest) -> Result<TrackerResponse> {
        info!("Announcing to tracker: {}", tracker_url);

        let mut url = Url::parse(tracker_url)?;
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => {
                format!("{}&{}", existing, request.to_query_string())
            }
            _ => request.to_query_string(),
        };
        url.set_query(Some(&query));

        debug!("Tracker request URL: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!("Tracker response status: {}, body length: {}", status, body.len());

        if !status.is_success() {
            return Err(BittorrentError::TrackerError(format!("HTTP error: {}", status)));
        }

        let tracker_response = TrackerResponse::from_bencode(&decode(&body)?)?;

        info!(
            "Received {} peers from tracker (interval: {}s)",
            tracker_response.peers.len(),
            tracker_response.interval
        );

        Ok(tracker_response)
    }
}
