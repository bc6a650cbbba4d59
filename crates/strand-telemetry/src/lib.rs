//! Logging initialization for the strand workspace.

pub mod logging;

pub use logging::{init, LogFormat, LoggingConfig};
