//! Thread-safe asynchronous logger implementation.
//!
//! This module provides the main [`Logger`] interface. Messages are handed
//! to a writer thread over a channel so real-time threads never block on
//! file I/O.

use crate::error::Result;
use crate::log_level::LogLevel;
use crate::log_message::LogMessage;
use crate::log_writer::spawn_writer_thread;
use std::path::PathBuf;
use std::sync::mpsc::{Sender, channel};

/// Construction options for a root [`Logger`].
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Destination file. `None` disables file output.
    pub log_path: Option<PathBuf>,
    pub level: LogLevel,
    /// Echo every accepted message to stdout.
    pub console_output: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            log_path: None,
            level: LogLevel::Info,
            console_output: false,
        }
    }
}

/// Thread-safe, non-blocking logger.
///
/// Cloneable instances share the same channel to a dedicated writer thread.
///
/// # Examples
///
/// ```no_run
/// use logging::{Logger, LogLevel};
///
/// let logger = Logger::new("t140.log".into(), LogLevel::Info).unwrap();
/// let rtcp = logger.for_component("RTCP-SEND");
/// rtcp.info("Sender report scheduled");
/// ```
#[derive(Clone)]
pub struct Logger {
    sender: Sender<LogMessage>,
    level: LogLevel,
    component: Option<String>,
    console_output: bool,
}

impl Logger {
    /// Creates a file logger with a dedicated writer thread.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created or opened.
    pub fn new(log_path: PathBuf, level: LogLevel) -> Result<Self> {
        Self::with_options(LoggerOptions {
            log_path: Some(log_path),
            level,
            console_output: false,
        })
    }

    /// Creates a logger from explicit options.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be opened or the writer thread
    /// cannot be spawned.
    pub fn with_options(options: LoggerOptions) -> Result<Self> {
        let (sender, receiver) = channel();
        spawn_writer_thread(options.log_path.as_deref(), receiver)?;
        Ok(Logger {
            sender,
            level: options.level,
            component: None,
            console_output: options.console_output,
        })
    }

    /// A logger that drops everything. Useful for tools and tests that do
    /// not care about output.
    pub fn discard() -> Self {
        let (sender, _) = channel();
        Logger {
            sender,
            level: LogLevel::Error,
            component: None,
            console_output: false,
        }
    }

    /// Returns a logger tagged with `component` that shares this logger's
    /// writer thread, level and console setting.
    pub fn for_component(&self, component: &str) -> Self {
        Logger {
            sender: self.sender.clone(),
            level: self.level,
            component: Some(component.to_string()),
            console_output: self.console_output,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs an error message (always recorded).
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        let msg = LogMessage::new(level, self.component.as_deref(), message);
        if self.console_output {
            print!("{}", msg.format());
        }
        // Writer gone means the logger was discarded or the process is exiting.
        let _ = self.sender.send(msg);
    }
}
