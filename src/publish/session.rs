//! Publish session: one broker connection, connect to disconnect
//!
//! The session owns its transport exclusively and walks a fixed sequence:
//! configure, connect, declare topics, publish readings, publish status,
//! disconnect. Every message is retained at the configured QoS.

use super::topics::StationTopicMap;
use crate::config::{ConfigError, MqttSection, RelayConfig};
use crate::feed::{Reading, StatusInfo};
use crate::transport::mqtt::{qos_from_level, ConnectParams, MqttError};
use crate::transport::Transport;
use rumqttc::v5::mqttbytes::QoS;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Lifecycle of a publish session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    /// TLS material loaded, nothing sent yet
    Configured,
    Connecting,
    Connected,
    Publishing,
    Disconnecting,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configured => "configured",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Publishing => "publishing",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of dispatching one reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { topic: String },
    /// Station not in the topic map; nothing was sent
    Dropped { station_id: u32 },
}

/// Counts for one `publish_run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub dropped: usize,
    /// Topics whose publish failed
    pub failed: Vec<String>,
}

impl PublishSummary {
    /// Publishes actually handed to the transport
    pub fn attempted(&self) -> usize {
        self.published + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Broker session driving a [`Transport`]
pub struct PublishSession<T: Transport> {
    transport: T,
    routes: StationTopicMap,
    status_topic: String,
    qos: QoS,
    retain: bool,
    state: SessionState,
    declared: Vec<String>,
}

impl<T: Transport> PublishSession<T> {
    pub fn new(transport: T, routes: StationTopicMap, status_topic: String, qos: QoS) -> Self {
        Self {
            transport,
            routes,
            status_topic,
            qos,
            retain: true,
            state: SessionState::Unconfigured,
            declared: Vec::new(),
        }
    }

    /// Build a session with the routes, status topic and QoS from `config`
    pub fn from_config(transport: T, config: &RelayConfig) -> Result<Self, ConfigError> {
        let routes = StationTopicMap::from_config(&config.topics)?;
        let qos = qos_from_level(config.mqtt.qos)?;
        Ok(Self::new(
            transport,
            routes,
            config.topics.status.clone(),
            qos,
        ))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the transport instance for testing
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn routes(&self) -> &StationTopicMap {
        &self.routes
    }

    pub fn declared_topics(&self) -> &[String] {
        &self.declared
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Publish session state changed");
            self.state = next;
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), MqttError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MqttError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Load TLS material and hand connection parameters to the transport
    ///
    /// A missing trust store or key store fails here, before any network
    /// attempt.
    pub fn configure(&mut self, mqtt: &MqttSection) -> Result<(), ConfigError> {
        if self.state != SessionState::Unconfigured {
            return Err(ConfigError::InvalidConfig(format!(
                "session cannot be configured while {}",
                self.state
            )));
        }

        match ConnectParams::from_config(mqtt) {
            Ok(params) => {
                self.transport.configure(params);
                self.set_state(SessionState::Configured);
                info!(
                    trust_store = %mqtt.trust_store.display(),
                    key_store = %mqtt.key_store.display(),
                    "TLS material loaded"
                );
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Open the broker session; terminal on failure
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        self.require("connect", &[SessionState::Configured])?;
        self.set_state(SessionState::Connecting);

        match self.transport.connect().await {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Record the station topics and the status topic; no broker traffic
    pub fn declare_topics(&mut self) -> Result<&[String], MqttError> {
        self.require("declare topics", &[SessionState::Connected])?;

        self.declared = self
            .routes
            .topics()
            .chain(std::iter::once(self.status_topic.as_str()))
            .map(str::to_string)
            .collect();
        debug!(topics = ?self.declared, "Declared topics");
        Ok(&self.declared)
    }

    /// Publish one reading to its station topic, or drop it when unmapped
    pub async fn publish_reading(&mut self, reading: &Reading) -> Result<PublishOutcome, MqttError> {
        self.require(
            "publish",
            &[SessionState::Connected, SessionState::Publishing],
        )?;
        self.set_state(SessionState::Publishing);

        let Some(topic) = self.routes.topic_for(reading.station_id) else {
            debug!(station_id = reading.station_id, "No topic for station, dropping reading");
            return Ok(PublishOutcome::Dropped {
                station_id: reading.station_id,
            });
        };
        let topic = topic.to_string();

        let payload = reading.payload();
        self.transport
            .publish(&topic, payload.clone().into_bytes(), self.qos, self.retain)
            .await?;

        info!(
            station_id = reading.station_id,
            topic = %topic,
            value = %payload,
            "Published reading"
        );
        Ok(PublishOutcome::Published { topic })
    }

    /// Publish the feed status to the status topic
    pub async fn publish_status(&mut self, status: &StatusInfo) -> Result<(), MqttError> {
        self.require(
            "publish",
            &[SessionState::Connected, SessionState::Publishing],
        )?;
        self.set_state(SessionState::Publishing);

        self.transport
            .publish(
                &self.status_topic,
                status.as_str().as_bytes().to_vec(),
                self.qos,
                self.retain,
            )
            .await?;

        info!(topic = %self.status_topic, status = %status, "Published status");
        Ok(())
    }

    /// Publish every reading, then the status
    ///
    /// A failed publish is logged and counted; the remaining readings and the
    /// status are still attempted.
    pub async fn publish_run(&mut self, readings: &[Reading], status: &StatusInfo) -> PublishSummary {
        let mut summary = PublishSummary::default();

        for reading in readings {
            match self.publish_reading(reading).await {
                Ok(PublishOutcome::Published { .. }) => summary.published += 1,
                Ok(PublishOutcome::Dropped { .. }) => summary.dropped += 1,
                Err(e) => {
                    let topic = self
                        .routes
                        .topic_for(reading.station_id)
                        .unwrap_or_default()
                        .to_string();
                    error!(station_id = reading.station_id, topic = %topic, "Publish failed: {}", e);
                    summary.failed.push(topic);
                }
            }
        }

        match self.publish_status(status).await {
            Ok(()) => summary.published += 1,
            Err(e) => {
                error!(topic = %self.status_topic, "Status publish failed: {}", e);
                summary.failed.push(self.status_topic.clone());
            }
        }

        summary
    }

    /// Close the broker session
    ///
    /// Sessions that never connected close without touching the transport.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        match self.state {
            SessionState::Connected | SessionState::Publishing => {}
            SessionState::Closed | SessionState::Failed => return Ok(()),
            _ => {
                self.set_state(SessionState::Closed);
                return Ok(());
            }
        }

        self.set_state(SessionState::Disconnecting);
        match self.transport.disconnect().await {
            Ok(()) => {
                self.set_state(SessionState::Closed);
                Ok(())
            }
            Err(e) => {
                warn!("Disconnect failed: {}", e);
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }
}
