//! HTTPS retrieval of the feed body
//!
//! The fetcher performs exactly one GET per run; there is no retry.

use crate::config::FeedSection;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Feed transport errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Source of the raw feed body
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the complete response body for `url`
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FeedSection) -> Result<Self, FetchError> {
        if config.accept_invalid_certs {
            warn!(
                url = %config.url,
                "Feed TLS peer verification is disabled (feed.accept_invalid_certs = true)"
            );
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("sensor2mqtt/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;

        debug!(url = %url, bytes = body.len(), "Fetched feed body");
        Ok(body)
    }
}
