//! Text session management
//!
//! RTCP session state, per-source statistics and the four threads that move
//! text between the application buffers and the network.

mod clock;
mod events;
mod rtcp_receiver;
mod rtcp_sender;
pub mod rtcp_session;
mod rtp_receiver;
mod rtp_sender;
pub mod source;
mod text_session;

// Re-export public types
pub use clock::TextClock;
pub use events::{SessionEvent, StopReason};
pub use rtcp_session::{Interval, LocalSdes, RtcpParams, RtcpSession, WakeAction};
pub use source::Source;
pub use text_session::TextSession;
