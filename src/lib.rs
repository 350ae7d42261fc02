//! sensor2mqtt - air temperature feed to MQTT relay
//!
//! Fetches a public air-temperature feed over HTTPS, extracts the per-station
//! readings and the feed status, and republishes them as retained messages on
//! a TLS-secured MQTT broker. One pass per invocation.
//!
//! # Overview
//!
//! - [`feed`] - HTTPS fetch and label-anchored parsing of the feed body
//! - [`publish`] - station to topic routing and the broker publish session
//! - [`transport`] - MQTT v5 client with client-certificate TLS and a last will
//! - [`relay`] - the fetch, parse, publish sequence and its exit status
//!
//! # Quick Start
//!
//! ```rust
//! use sensor2mqtt::feed::{parse_feed, Reading};
//! use sensor2mqtt::publish::StationTopicMap;
//!
//! let body = r#"{"readings":[{"station_id":"S50","value":29.8}],
//!                "api_info":{"status":"healthy"}}"#;
//! let feed = parse_feed(body).unwrap();
//! assert_eq!(feed.readings, vec![Reading::new(50, 29.8)]);
//! assert_eq!(feed.status.as_str(), "healthy");
//!
//! let routes = StationTopicMap::new([(50, "/api/temperature/S50")]).unwrap();
//! assert_eq!(routes.topic_for(50), Some("/api/temperature/S50"));
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod observability;
pub mod publish;
pub mod relay;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use feed::{ParsedFeed, Reading, StatusInfo};
pub use publish::{PublishSession, SessionState};
pub use relay::{Relay, RunReport};
pub use transport::mqtt::MqttClient;
