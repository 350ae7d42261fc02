//! One relay run: fetch, parse, publish, disconnect
//!
//! Stages run strictly in sequence and the first failing stage ends the run
//! with its [`RelayError`]. TLS material is loaded before the fetch so a
//! missing trust or key store aborts without any network I/O.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::feed::{parse_feed, Fetcher, Reading, StatusInfo};
use crate::publish::{PublishSession, PublishSummary, SessionState};
use crate::transport::Transport;
use crate::{fetch_span, mqtt_span};
use tracing::{error, info, warn, Instrument};

/// What a successful run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Readings found in the feed body
    pub readings: usize,
    pub status: StatusInfo,
    pub summary: PublishSummary,
}

/// Relay wiring a fetcher to a publish session
pub struct Relay<F, T>
where
    F: Fetcher,
    T: Transport,
{
    config: RelayConfig,
    fetcher: F,
    session: PublishSession<T>,
}

impl<F, T> Relay<F, T>
where
    F: Fetcher,
    T: Transport,
{
    /// Create a relay with injected fetcher and transport
    pub fn new(config: RelayConfig, fetcher: F, transport: T) -> Result<Self, RelayError> {
        let session = PublishSession::from_config(transport, &config)?;
        Ok(Self {
            config,
            fetcher,
            session,
        })
    }

    pub fn session(&self) -> &PublishSession<T> {
        &self.session
    }

    /// Execute one pass of the relay
    pub async fn run(&mut self) -> RelayResult<RunReport> {
        self.session.configure(&self.config.mqtt)?;

        let url = self.config.feed.url.clone();
        let body = match self
            .fetcher
            .fetch(&url)
            .instrument(fetch_span!(url = %url))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                error!(url = %url, "Failed to fetch feed: {}", e);
                return Err(e.into());
            }
        };

        let feed = match parse_feed(&body) {
            Ok(feed) => feed,
            Err(e) => {
                error!(bytes = body.len(), "Failed to parse feed: {}", e);
                return Err(e.into());
            }
        };
        info!(
            readings = feed.readings.len(),
            status = %feed.status,
            "Parsed feed"
        );

        let span = mqtt_span!(broker = %self.config.mqtt.broker_url);
        let summary = self
            .publish(&feed.readings, &feed.status)
            .instrument(span)
            .await?;

        if !summary.is_success() {
            return Err(RelayError::Publish {
                failed: summary.failed.len(),
                attempted: summary.attempted(),
            });
        }

        info!(
            published = summary.published,
            dropped = summary.dropped,
            "Relay run complete"
        );
        Ok(RunReport {
            readings: feed.readings.len(),
            status: feed.status,
            summary,
        })
    }

    async fn publish(
        &mut self,
        readings: &[Reading],
        status: &StatusInfo,
    ) -> RelayResult<PublishSummary> {
        if let Err(e) = self.session.connect().await {
            error!(kind = ?e.connect_failure_kind(), "Failed to connect to broker: {}", e);
            return Err(e.into());
        }

        let declared = self.session.declare_topics().map(<[String]>::len);
        if let Err(e) = declared {
            self.close().await;
            return Err(e.into());
        }

        let summary = self.session.publish_run(readings, status).await;
        self.close().await;
        Ok(summary)
    }

    /// Disconnect; failures are logged only
    async fn close(&mut self) {
        if let Err(e) = self.session.disconnect().await {
            warn!("Ignoring disconnect failure: {}", e);
        }
        if self.session.state() != SessionState::Closed {
            warn!(state = %self.session.state(), "Session did not close cleanly");
        }
    }
}
