//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the relay without
//! requiring an MQTT broker or the upstream feed.

pub mod mocks;

pub use mocks::*;
