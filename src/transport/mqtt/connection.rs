//! Pure connection parameter handling for the MQTT client
//!
//! This module loads TLS material, resolves credentials, and turns the
//! resulting [`ConnectParams`] into rumqttc options. Nothing here touches the
//! network.

use crate::config::{ConfigError, MqttSection};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state of the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// TLS handshake and CONNECT in flight
    Connecting,
    /// ConnAck received, ready to publish
    Connected,
    /// Closed, either by us or by the broker
    Disconnected(String),
    /// Connection attempt failed
    Failed(ConnectFailure),
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected(_) => "disconnected",
            ConnectionState::Failed(_) => "failed",
        }
    }
}

/// Why a connection attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailureKind {
    Timeout,
    AuthFailure,
    Tls,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectFailure {
    pub kind: ConnectFailureKind,
    pub reason: String,
}

impl ConnectFailure {
    pub fn new<S: Into<String>>(kind: ConnectFailureKind, reason: S) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Timed out after {0:?} waiting for ConnAck")]
    ConnectTimeout(Duration),
    #[error("Connection timed out: {0}")]
    ConnectionTimedOut(String),
    #[error("Broker refused the connection: {0}")]
    AuthFailure(String),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing to {topic} failed: {source}")]
    PublishFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Publishing to {topic} timed out after {timeout:?}")]
    PublishTimeout { topic: String, timeout: Duration },
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: Option<ConnectionState> },
    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    #[error("Transport has not been configured")]
    NotConfigured,
}

impl MqttError {
    /// Classify a connect-phase error; `None` for errors outside connect
    pub fn connect_failure_kind(&self) -> Option<ConnectFailureKind> {
        match self {
            MqttError::ConnectTimeout(_) | MqttError::ConnectionTimedOut(_) => {
                Some(ConnectFailureKind::Timeout)
            }
            MqttError::AuthFailure(_) => Some(ConnectFailureKind::AuthFailure),
            MqttError::Tls(_) => Some(ConnectFailureKind::Tls),
            MqttError::ConnectionFailed(_) => Some(ConnectFailureKind::Network),
            _ => None,
        }
    }
}

impl From<ConnectFailure> for MqttError {
    fn from(failure: ConnectFailure) -> Self {
        match failure.kind {
            ConnectFailureKind::AuthFailure => MqttError::AuthFailure(failure.reason),
            ConnectFailureKind::Tls => MqttError::Tls(failure.reason),
            ConnectFailureKind::Timeout => MqttError::ConnectionTimedOut(failure.reason),
            ConnectFailureKind::Network => MqttError::ConnectionFailed(failure.reason),
        }
    }
}

/// Broker host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

/// Parse `mqtts://host[:port]` (or `ssl://`); the port defaults to 8883
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    if !matches!(url.scheme(), "mqtts" | "ssl") {
        return Err(MqttError::InvalidBrokerUrl(broker_url.to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    Ok(BrokerAddress {
        host: host.to_string(),
        port: url.port().unwrap_or(8883),
    })
}

/// Map a configured QoS level onto rumqttc's QoS
pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

/// PEM material for mutual TLS
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterials {
    pub ca: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl TlsMaterials {
    /// Read trust and key material from disk
    ///
    /// Runs before any network activity so a missing file aborts the run
    /// without touching the broker.
    pub fn load(config: &MqttSection) -> Result<Self, ConfigError> {
        let ca = read_material(&config.trust_store, ConfigError::MissingTrustStore)?;
        let client_key = read_material(&config.key_store, ConfigError::MissingKeyStore)?;
        let client_cert = match &config.client_cert {
            Some(path) => read_material(path, ConfigError::MissingClientCert)?,
            None => client_key.clone(),
        };

        Ok(Self {
            ca,
            client_cert,
            client_key,
        })
    }
}

impl fmt::Debug for TlsMaterials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterials")
            .field("ca_bytes", &self.ca.len())
            .field("client_cert_bytes", &self.client_cert.len())
            .field("client_key", &"***")
            .finish()
    }
}

fn read_material(
    path: &Path,
    missing: fn(std::path::PathBuf) -> ConfigError,
) -> Result<Vec<u8>, ConfigError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing(path.to_path_buf())),
        Err(e) => Err(ConfigError::FileRead(e)),
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Message the broker publishes for us if we vanish without DISCONNECT
#[derive(Debug, Clone, PartialEq)]
pub struct LastWillMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// Everything needed to open the broker session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub broker: BrokerAddress,
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub last_will: LastWillMessage,
    pub tls: TlsMaterials,
    pub timeout: Duration,
    pub keep_alive: Duration,
}

impl ConnectParams {
    /// Build connection parameters, loading TLS material first
    pub fn from_config(config: &MqttSection) -> Result<Self, ConfigError> {
        let tls = TlsMaterials::load(config)?;

        let broker = parse_broker_url(&config.broker_url)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        let qos = qos_from_level(config.qos)?;

        let credentials = config.username().map(|username| Credentials {
            username,
            password: config.password().unwrap_or_default(),
        });

        Ok(Self {
            broker,
            client_id: config.client_id.clone(),
            credentials,
            last_will: LastWillMessage {
                topic: config.last_will.topic.clone(),
                payload: config.last_will.payload.clone(),
                qos,
                retain: true,
            },
            tls,
            timeout: config.timeout(),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
        })
    }
}

/// Pure function to build rumqttc options from connection parameters
pub fn configure_mqtt_options(params: &ConnectParams) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        params.client_id.clone(),
        params.broker.host.clone(),
        params.broker.port,
    );

    // Broker certificate is verified against the trust store and we
    // authenticate with our own certificate.
    let transport = RumqttcTransport::tls(
        params.tls.ca.clone(),
        Some((params.tls.client_cert.clone(), params.tls.client_key.clone())),
        None,
    );
    mqtt_options.set_transport(transport);

    if let Some(credentials) = &params.credentials {
        mqtt_options.set_credentials(&credentials.username, &credentials.password);
    }

    mqtt_options.set_keep_alive(params.keep_alive);
    mqtt_options.set_clean_start(true);

    // MQTT v5 LastWill takes 5 parameters: topic, payload, qos, retain, properties
    let lwt = LastWill::new(
        &params.last_will.topic,
        params.last_will.payload.clone(),
        params.last_will.qos,
        params.last_will.retain,
        None,
    );
    mqtt_options.set_last_will(lwt);

    mqtt_options
}
