//! Session configuration

pub mod logging_config;
pub mod session_config;

pub use logging_config::LoggingConfig;
pub use session_config::{RedundancyMode, SessionConfig};
