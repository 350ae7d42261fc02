//! Relay configuration
//!
//! Every field has a built-in default reproducing the relay's fixed constants, so
//! the relay runs without a config file. A TOML file may override any subset.

use crate::publish::topics::validate_topic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main relay configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub topics: TopicsSection,
}

/// Upstream feed section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSection {
    /// HTTPS endpoint returning the readings document
    #[serde(default = "default_feed_url")]
    pub url: String,
    /// Skip TLS peer verification for the feed request.
    ///
    /// Enabled by default: the relay deliberately does not verify the feed's
    /// certificate. Set to `false` to turn verification on.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    /// Whole-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtts://host:port` (or `ssl://`)
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Environment variable containing username
    #[serde(default = "default_username_env")]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default = "default_password_env")]
    pub password_env: Option<String>,
    /// PEM trust chain used to verify the broker
    #[serde(default = "default_trust_store")]
    pub trust_store: PathBuf,
    /// PEM private key for client authentication
    #[serde(default = "default_key_store")]
    pub key_store: PathBuf,
    /// PEM client certificate chain. When absent the certificate is read from
    /// the key store, which then has to carry both blocks.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// QoS level (0, 1 or 2) for every publish and the last will
    #[serde(default = "default_qos")]
    pub qos: u8,
    /// Connect, publish and disconnect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub last_will: LastWillSection,
}

/// Last will published by the broker on ungraceful disconnect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastWillSection {
    #[serde(default = "default_lwt_topic")]
    pub topic: String,
    #[serde(default = "default_lwt_payload")]
    pub payload: String,
}

/// Output topics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Feed status topic
    #[serde(default = "default_status_topic")]
    pub status: String,
    /// Station to topic routes; readings from any other station are dropped
    #[serde(default = "default_stations")]
    pub stations: Vec<StationRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationRoute {
    pub id: u32,
    pub topic: String,
}

fn default_feed_url() -> String {
    "https://api.data.gov.sg/v1/environment/air-temperature".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_broker_url() -> String {
    "mqtts://localhost:8885".to_string()
}

fn default_client_id() -> String {
    "mqtt_id".to_string()
}

fn default_username_env() -> Option<String> {
    Some("MQTT_USERNAME".to_string())
}

fn default_password_env() -> Option<String> {
    Some("MQTT_PASSWORD".to_string())
}

fn default_trust_store() -> PathBuf {
    PathBuf::from("ssl/client.crt")
}

fn default_key_store() -> PathBuf {
    PathBuf::from("ssl/client.key")
}

fn default_qos() -> u8 {
    1
}

fn default_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    60
}

fn default_lwt_topic() -> String {
    "events/disconnect".to_string()
}

fn default_lwt_payload() -> String {
    "temperature sensor disconnected.".to_string()
}

fn default_status_topic() -> String {
    "/api/status".to_string()
}

fn default_stations() -> Vec<StationRoute> {
    [50, 107, 60]
        .into_iter()
        .map(|id| StationRoute {
            id,
            topic: format!("/api/temperature/S{id}"),
        })
        .collect()
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            accept_invalid_certs: default_accept_invalid_certs(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            client_id: default_client_id(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            trust_store: default_trust_store(),
            key_store: default_key_store(),
            client_cert: None,
            qos: default_qos(),
            timeout_secs: default_timeout(),
            keep_alive_secs: default_keep_alive(),
            last_will: LastWillSection::default(),
        }
    }
}

impl Default for LastWillSection {
    fn default() -> Self {
        Self {
            topic: default_lwt_topic(),
            payload: default_lwt_payload(),
        }
    }
}

impl Default for TopicsSection {
    fn default() -> Self {
        Self {
            status: default_status_topic(),
            stations: default_stations(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("The trust store file does not exist: {}", .0.display())]
    MissingTrustStore(PathBuf),
    #[error("The key store file does not exist: {}", .0.display())]
    MissingKeyStore(PathBuf),
    #[error("The client certificate file does not exist: {}", .0.display())]
    MissingClientCert(PathBuf),
    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Station {0} is routed to more than one topic")]
    DuplicateStation(u32),
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
}

impl RelayConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "feed.url must not be empty".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_id must not be empty".to_string(),
            ));
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::InvalidQos(self.mqtt.qos));
        }
        if self.mqtt.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let scheme_ok = Url::parse(&self.mqtt.broker_url)
            .map(|url| matches!(url.scheme(), "mqtts" | "ssl") && url.host_str().is_some())
            .unwrap_or(false);
        if !scheme_ok {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.broker_url '{}' must be an mqtts:// or ssl:// URL",
                self.mqtt.broker_url
            )));
        }

        validate_topic(&self.topics.status)?;
        validate_topic(&self.mqtt.last_will.topic)?;

        let mut seen = HashSet::new();
        for route in &self.topics.stations {
            if !seen.insert(route.id) {
                return Err(ConfigError::DuplicateStation(route.id));
            }
            validate_topic(&route.topic)?;
        }

        Ok(())
    }
}

impl MqttSection {
    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        self.username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FeedSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
