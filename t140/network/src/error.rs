//! Network error types
//!
//! Wire-format problems are normally logged and absorbed where they are
//! found; these errors surface only from constructors, encoders and
//! explicit validation calls.

use std::fmt;
pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug)]
pub enum NetworkError {
    Config(String),
    Network(String),
    Rtp(String),
    Rtcp(String),
    InvalidPacket(String),
    Redundancy(String),
    ThreadError(String),
    ChannelError(String),
    /// The buffer or session has been shut down.
    Closed,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Config(msg) => write!(f, "Config error: {}", msg),
            NetworkError::Network(msg) => write!(f, "Network error: {}", msg),
            NetworkError::Rtp(msg) => write!(f, "RTP error: {}", msg),
            NetworkError::Rtcp(msg) => write!(f, "RTCP error: {}", msg),
            NetworkError::InvalidPacket(msg) => write!(f, "Invalid packet: {}", msg),
            NetworkError::Redundancy(msg) => write!(f, "Redundancy error: {}", msg),
            NetworkError::ThreadError(msg) => write!(f, "Thread error: {}", msg),
            NetworkError::ChannelError(msg) => write!(f, "Channel error: {}", msg),
            NetworkError::Closed => write!(f, "Closed"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<logging::LoggingError> for NetworkError {
    fn from(err: logging::LoggingError) -> Self {
        NetworkError::Config(format!("logger setup failed: {}", err))
    }
}
