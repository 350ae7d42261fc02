//! Mock implementations for testing
//!
//! Provides mock Transport and Fetcher implementations to exercise the relay
//! without a broker or network access.

use crate::feed::{FetchError, Fetcher};
use crate::transport::mqtt::{ConnectFailure, ConnectFailureKind, ConnectParams, MqttError};
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// One message handed to [`MockTransport::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct TransportLog {
    params: Option<ConnectParams>,
    connect_calls: usize,
    disconnect_calls: usize,
    connected: bool,
    published: Vec<PublishedMessage>,
    connect_failure: Option<ConnectFailureKind>,
    failing_topics: HashSet<String>,
}

/// Mock transport for testing
///
/// Clones share one log, so a test can keep a handle after moving the
/// transport into a session.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, TransportLog> {
        // A panicking test thread must not hide the recorded calls.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `connect` fail with `kind`
    pub fn fail_connect(&self, kind: ConnectFailureKind) {
        self.log().connect_failure = Some(kind);
    }

    /// Make every publish to `topic` fail
    pub fn fail_publish_to(&self, topic: impl Into<String>) {
        self.log().failing_topics.insert(topic.into());
    }

    pub fn configured_params(&self) -> Option<ConnectParams> {
        self.log().params.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.log().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.log().disconnect_calls
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.log().published.clone()
    }

    pub fn published_topics(&self) -> Vec<String> {
        self.log()
            .published
            .iter()
            .map(|message| message.topic.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn configure(&mut self, params: ConnectParams) {
        self.log().params = Some(params);
    }

    async fn connect(&mut self) -> Result<(), MqttError> {
        let mut log = self.log();
        log.connect_calls += 1;

        if log.params.is_none() {
            return Err(MqttError::NotConfigured);
        }
        if let Some(kind) = log.connect_failure.take() {
            return Err(ConnectFailure::new(kind, "Mock connection failure").into());
        }

        log.connected = true;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        let mut log = self.log();
        if !log.connected {
            return Err(MqttError::NotConnected { state: None });
        }
        if log.failing_topics.contains(topic) {
            return Err(MqttError::PublishFailed {
                topic: topic.to_string(),
                source: "Mock publish failure".into(),
            });
        }

        log.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let mut log = self.log();
        log.disconnect_calls += 1;
        log.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.log().connected
    }
}

/// Mock fetcher returning a canned body or HTTP status failure
#[derive(Debug, Clone)]
pub struct MockFetcher {
    response: Result<String, u16>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            response: Ok(body.into()),
            requests: Arc::default(),
        }
    }

    /// Fail every fetch with HTTP `status`
    pub fn with_status(status: u16) -> Self {
        Self {
            response: Err(status),
            requests: Arc::default(),
        }
    }

    /// URLs requested so far
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        match &self.response {
            Ok(body) => Ok(body.clone()),
            Err(status) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
        }
    }
}
