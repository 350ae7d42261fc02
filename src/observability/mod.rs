//! Observability for the relay: structured logging and span macros

pub mod logging;

pub use logging::{init_default_logging, init_logging, init_logging_with_verbosity, LogFormat};

// Span macros for structured logging
pub use logging::{fetch_span, mqtt_span};
