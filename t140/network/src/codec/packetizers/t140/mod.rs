//! RFC 4103 T.140 text packetization
//!
//! The packetizer frames text with optional RED redundancy (RFC 2198
//! framing, RFC 4103 Section 4); the depacketizer reorders, recovers lost
//! packets from redundant generations and substitutes a loss marker when a
//! packet cannot be recovered in time.

mod depacketizer;
mod packetizer;
pub mod red;

pub use depacketizer::{
    DepacketizerStats, LOSS_CHAR, RtpTextDepacketizer, WAIT_FOR_MISSING_PACKET,
    WAIT_FOR_MISSING_PACKET_RED,
};
pub use packetizer::{RtpTextPacketizer, split_utf8};

use crate::codec::rtp::RtpHeader;
use crate::codec::rtp::RtpPacket;

/// Negotiated payload types for a text session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadTypes {
    /// Plain T.140 text (`text/t140`)
    pub t140: u8,
    /// RED wrapper (`text/red`)
    pub red: u8,
}

impl Default for PayloadTypes {
    fn default() -> Self {
        Self { t140: 98, red: 100 }
    }
}

/// One packet's worth of text payload plus the RTP fields the codec needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpTextBuffer {
    pub data: Vec<u8>,
    pub timestamp: u32,
    pub sequence_number: u16,
    pub ssrc: u32,
    pub marker: bool,
    pub payload_type: u8,
}

impl RtpTextBuffer {
    pub fn into_packet(self) -> RtpPacket {
        let mut header = RtpHeader::new(self.payload_type, self.ssrc);
        header.sequence_number = self.sequence_number;
        header.timestamp = self.timestamp;
        header.marker = self.marker;
        RtpPacket::new(header, self.data)
    }
}

impl From<RtpPacket> for RtpTextBuffer {
    fn from(packet: RtpPacket) -> Self {
        Self {
            timestamp: packet.header.timestamp,
            sequence_number: packet.header.sequence_number,
            ssrc: packet.header.ssrc,
            marker: packet.header.marker,
            payload_type: packet.header.payload_type,
            data: packet.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_packet_conversion() {
        let buffer = RtpTextBuffer {
            data: b"hi".to_vec(),
            timestamp: 300,
            sequence_number: 9,
            ssrc: 77,
            marker: true,
            payload_type: 100,
        };
        let packet = buffer.clone().into_packet();
        assert_eq!(packet.header.payload_type, 100);
        assert!(packet.header.marker);
        assert_eq!(RtpTextBuffer::from(packet), buffer);
    }
}
