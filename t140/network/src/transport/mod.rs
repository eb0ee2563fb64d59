//! Transport layer
//!
//! Plain UDP; RTP and RTCP each get their own socket.

pub mod udp;

pub use udp::{TransportStats, UdpTransport};
