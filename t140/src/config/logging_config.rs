use logging::{LogLevel, Logger, LoggerOptions};
use serde::Deserialize;
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_file_path: String,
    pub log_level: String,
    pub enable_console: bool,
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_file_path: "t140.log".to_string(),
            log_level: "info".to_string(),
            enable_console: false,
            enable_file: true,
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or_default()
    }

    /// Builds the root logger described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be opened.
    pub fn build_logger(&self) -> logging::Result<Logger> {
        Logger::with_options(LoggerOptions {
            log_path: self
                .enable_file
                .then(|| PathBuf::from(&self.log_file_path)),
            level: self.level(),
            console_output: self.enable_console,
        })
    }
}
