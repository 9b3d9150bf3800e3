//! Snapshot extraction client
//!
//! The extraction service normalizes a live listing page into a
//! [`Snapshot`]. An unreachable or unparseable page is "nothing to
//! ingest", not an error; a broken extractor is.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Source of normalized product observations
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch one observation for `url`; `None` when the page yields nothing
    async fn fetch(&self, url: &str) -> Result<Option<Snapshot>>;
}

/// HTTP client for a snapshot extraction endpoint
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, url: &str) -> Result<Option<Snapshot>> {
        let request_url = format!("{}/extract", self.base_url);
        let response = self
            .client
            .get(&request_url)
            .query(&[("url", url)])
            .header("User-Agent", "pricewatch/0.1")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                log::warn!("No snapshot available for {}", url);
                return Ok(None);
            }
            status if !status.is_success() => return Err(Error::HttpStatus(status)),
            _ => {}
        }

        match response.json::<Snapshot>().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // Page reachable but not recognizable as a listing
                log::warn!("Unparseable snapshot for {}: {}", url, e);
                Ok(None)
            }
        }
    }
}
