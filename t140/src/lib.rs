//! # T140 - Real-time text over RTP
//!
//! RFC 4103 text conversation sessions: T.140 text is buffered, framed with
//! RED redundancy, sent over RTP and reassembled on the far side with loss
//! markers where text could not be recovered. RTCP runs alongside with the
//! RFC 3550 interval rules.
//!
//! ## Public API
//!
//! ### Session
//! - **`TextSession`** - Sockets, buffers and threads of one session
//! - **`SessionEvent`** - New sources, reports, SDES, BYE, loss notifications
//! - **`StopReason`** - Immediate stop or flush-and-BYE
//!
//! ### Building blocks
//! - **`RtcpSession`** - RTCP membership, interval timer and report builder
//! - **`Source`** - Per-SSRC reception statistics
//! - **`TextSyncBuffer`** - Collects keystrokes into buffer-time windows
//! - **`FifoBuffer`** - Bounded blocking queue
//! - **`WorkerThread`** - Named thread with a stop signal
//!
//! ### Configuration
//! - **`SessionConfig`** - Ports, payload types, redundancy, RTCP bandwidth
//! - **`LoggingConfig`** - Log file, level and console output
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use t140::{SessionConfig, StopReason, TextSession};
//!
//! let config = SessionConfig::default().with_remote("192.0.2.10", 5004);
//! let logger = config.logging.build_logger().unwrap();
//! let mut session = TextSession::new(config, logger).unwrap();
//! session.start().unwrap();
//!
//! session.send_text("hello").unwrap();
//! if let Some(text) = session.read_text(Duration::from_secs(1)).unwrap() {
//!     println!("{}", String::from_utf8_lossy(&text));
//! }
//! session.stop(StopReason::Goodbye(None)).unwrap();
//! ```

pub mod buffer;
pub mod config;
pub mod session;
pub mod worker;

// ===== PUBLIC API - Session =====
pub use session::{
    Interval, LocalSdes, RtcpParams, RtcpSession, SessionEvent, Source, StopReason, TextClock,
    TextSession, WakeAction,
};

// ===== PUBLIC API - Buffers and threads =====
pub use buffer::{DEFAULT_BUFFER_TIME, FifoBuffer, TextSyncBuffer};
pub use worker::{StopSignal, WorkerState, WorkerThread};

// ===== PUBLIC API - Configuration =====
pub use config::{LoggingConfig, RedundancyMode, SessionConfig};

// ===== PUBLIC API - Wire level =====
pub use network::{
    DepacketizerStats, NetworkError, PayloadTypes, RtpTextDepacketizer, RtpTextPacketizer,
    T140RedundancyFilter, UdpTransport,
};

pub type Result<T> = std::result::Result<T, NetworkError>;
