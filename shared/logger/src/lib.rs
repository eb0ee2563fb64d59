//! Thread-safe asynchronous logging library.
//!
//! One writer thread per root [`Logger`]; component loggers derived with
//! [`Logger::for_component`] share that thread.

pub mod error;
mod log_level;
mod log_message;
mod log_writer;
mod logger;

pub use error::{LoggingError, Result};
pub use log_level::LogLevel;
pub use logger::{Logger, LoggerOptions};
