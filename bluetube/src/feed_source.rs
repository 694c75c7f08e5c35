use std::time::Duration;

use async_trait::async_trait;
use bluetube_core::contract::{Feed, FeedSource};
use bluetube_core::error::FeedError;
use bluetube_core::feed::parse_feed;
use tracing::{debug, info};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches feeds over HTTP and parses them with [`parse_feed`].
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(concat!("bluetube/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FeedError> {
        debug!(url, "Fetching feed");
        let fetch_err = |e: reqwest::Error| FeedError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?
            .text()
            .await
            .map_err(fetch_err)?;
        let feed = parse_feed(&body)?;
        info!(url, title = %feed.title, entries = feed.entries.len(), "Feed fetched");
        Ok(feed)
    }
}
