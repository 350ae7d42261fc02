//! Transport layer for broker communication
//!
//! This module provides the broker-client abstraction the publish session
//! drives, and its MQTT implementation.

use rumqttc::v5::mqttbytes::QoS;

pub mod mqtt;

pub use mqtt::{ConnectParams, MqttError};

/// Broker client used by the publish session
///
/// This trait provides an abstraction over the broker connection to enable
/// dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Accept connection parameters; no network activity
    fn configure(&mut self, params: ConnectParams);

    /// Open the broker session and wait for ConnAck
    async fn connect(&mut self) -> Result<(), MqttError>;

    /// Hand one message to the broker connection
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError>;

    /// Close the broker session
    async fn disconnect(&mut self) -> Result<(), MqttError>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}
