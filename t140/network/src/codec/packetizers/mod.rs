//! RTP packetizers
//!
//! Only the RFC 4103 text payload format is carried by this crate.
pub mod t140;

pub use t140::{
    DepacketizerStats, PayloadTypes, RtpTextBuffer, RtpTextDepacketizer, RtpTextPacketizer,
};
