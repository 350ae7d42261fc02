//! Broker-side half of the relay
//!
//! - [`topics`] - the closed station to topic map
//! - [`session`] - connection lifecycle and per-station dispatch

pub mod session;
pub mod topics;

pub use session::{PublishOutcome, PublishSession, PublishSummary, SessionState};
pub use topics::{validate_topic, StationTopicMap};
