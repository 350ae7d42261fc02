//! Top-level error type for one relay run
//!
//! Each stage error is wrapped here and mapped onto the process exit status.

use crate::config::ConfigError;
use crate::feed::{FetchError, ParseError};
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Exit status for a fetch failure; the shell sees 255
pub const EXIT_FETCH_FAILURE: i32 = -1;
/// Exit status for missing TLS material, bad configuration or a broker failure
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for a feed body the parser could not read
pub const EXIT_PARSE_FAILURE: i32 = 2;

/// Main error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Feed transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("Feed parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] MqttError),

    #[error("{failed} of {attempted} publishes failed")]
    Publish { failed: usize, attempted: usize },
}

impl RelayError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Transport(_) => EXIT_FETCH_FAILURE,
            RelayError::Parse(_) => EXIT_PARSE_FAILURE,
            RelayError::Config(_) | RelayError::Connection(_) | RelayError::Publish { .. } => {
                EXIT_FAILURE
            }
        }
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
