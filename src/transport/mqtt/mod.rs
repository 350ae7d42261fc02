//! MQTT v5 client over client-certificate TLS
//!
//! The module separates pure functions from I/O:
//!
//! - [`connection`] - connection parameters, TLS material and error types
//! - [`message_handler`] - pure event routing and the delivery observer
//! - [`delivery`] - pairs each publish with its PubAck or PubComp
//! - [`client`] - the rumqttc client and its event loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensor2mqtt::config::MqttSection;
//! use sensor2mqtt::transport::mqtt::{ConnectParams, MqttClient};
//! use sensor2mqtt::transport::Transport;
//!
//! # tokio_test::block_on(async {
//! let params = ConnectParams::from_config(&MqttSection::default())?;
//!
//! let mut client = MqttClient::new();
//! client.configure(params);
//! client.connect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod delivery;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, parse_broker_url, qos_from_level, BrokerAddress, ConnectFailure,
    ConnectFailureKind, ConnectParams, ConnectionState, Credentials, LastWillMessage, MqttError,
    TlsMaterials,
};
pub use delivery::{DeliveryResult, DeliveryTracker};
pub use message_handler::{DeliveryObserver, EventRoute, LoggingObserver, MessageHandler};
