//! Upstream feed: retrieval and extraction of station readings
//!
//! - [`fetcher`] - one HTTPS GET returning the raw body
//! - [`parser`] - label-anchored extraction of readings and the feed status

pub mod fetcher;
pub mod parser;

pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use parser::{parse_feed, ParseError};

use std::fmt;

/// One station reading scraped from the feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub station_id: u32,
    pub value: f64,
}

impl Reading {
    pub fn new(station_id: u32, value: f64) -> Self {
        Self { station_id, value }
    }

    /// Decimal text published to the broker
    pub fn payload(&self) -> String {
        self.value.to_string()
    }
}

/// Feed-level status string, e.g. `healthy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo(String);

impl StatusInfo {
    pub fn new<S: Into<String>>(status: S) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything extracted from one feed body
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub readings: Vec<Reading>,
    pub status: StatusInfo,
}
