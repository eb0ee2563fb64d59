//! RTCP (RTP Control Protocol) Implementation
//!
//! Packet codecs for SR, RR, SDES and BYE (RFC 3550 Section 6) and the
//! compound-packet framing that carries them.

pub mod bye;
pub mod compound;
pub mod receiver_report;
pub mod report_block;
pub mod sdes;
pub mod sender_report;

pub use bye::ByePacket;
pub use compound::{CompoundPacket, RtcpPacket, build_compound, parse_compound};
pub use receiver_report::ReceiverReport;
pub use report_block::ReportBlock;
pub use sdes::{SdesChunk, SdesItem, SdesItemType, SourceDescription};
pub use sender_report::{NtpTimestamp, SenderReport};

use crate::error::{NetworkError, Result};
use crate::utils::read_u16_be;

pub const RTCP_VERSION: u8 = 2;
pub const RTCP_HEADER_SIZE: usize = 4;

/// Writes the common header. `length_words` is the packet length in
/// 32-bit words minus one, as carried on the wire.
pub(crate) fn write_rtcp_header(
    bytes: &mut Vec<u8>,
    packet_type: RtcpPacketType,
    count: usize,
    length_words: usize,
) {
    bytes.push((RTCP_VERSION << 6) | (count as u8 & 0x1F));
    bytes.push(packet_type as u8);
    bytes.extend_from_slice(&(length_words as u16).to_be_bytes());
}

/// Patches the length field once the packet body has been written.
pub(crate) fn finish_rtcp_packet(bytes: &mut [u8]) {
    let words = (bytes.len() / 4).saturating_sub(1) as u16;
    bytes[2..4].copy_from_slice(&words.to_be_bytes());
}

/// RTCP packet types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpPacketType {
    /// Sender Report (200)
    SR = 200,
    /// Receiver Report (201)
    RR = 201,
    /// Source Description (202)
    SDES = 202,
    /// Goodbye (203)
    BYE = 203,
    /// Application-defined (204)
    APP = 204,
}

impl RtcpPacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            200 => Some(RtcpPacketType::SR),
            201 => Some(RtcpPacketType::RR),
            202 => Some(RtcpPacketType::SDES),
            203 => Some(RtcpPacketType::BYE),
            204 => Some(RtcpPacketType::APP),
            _ => None,
        }
    }
}

/// The four-byte header shared by every RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub version: u8,
    pub padding: bool,
    /// Report count, source count or subtype depending on the packet type
    pub count: u8,
    pub packet_type: u8,
    /// Length in 32-bit words minus one
    pub length: u16,
}

impl RtcpHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < RTCP_HEADER_SIZE {
            return Err(NetworkError::Rtcp("Header too short".to_string()));
        }
        Ok(Self {
            version: data[0] >> 6,
            padding: (data[0] >> 5) & 0x01 == 1,
            count: data[0] & 0x1F,
            packet_type: data[1],
            length: read_u16_be(data, 2).unwrap_or(0),
        })
    }

    /// Total packet size in bytes, header included.
    pub fn packet_size(&self) -> usize {
        (self.length as usize + 1) * 4
    }
}

/// Returns the packet body (after the header) with any trailing padding
/// removed.
pub(crate) fn packet_body(data: &[u8]) -> Result<(RtcpHeader, &[u8])> {
    let header = RtcpHeader::from_bytes(data)?;
    let size = header.packet_size();
    if size > data.len() {
        return Err(NetworkError::Rtcp(format!(
            "Packet claims {} bytes, only {} available",
            size,
            data.len()
        )));
    }
    let mut end = size;
    if header.padding {
        let pad = data[size - 1] as usize;
        if pad == 0 || RTCP_HEADER_SIZE + pad > size {
            return Err(NetworkError::Rtcp(format!("Invalid padding count {}", pad)));
        }
        end -= pad;
    }
    Ok((header, &data[RTCP_HEADER_SIZE..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_from_u8() {
        assert_eq!(RtcpPacketType::from_u8(202), Some(RtcpPacketType::SDES));
        assert_eq!(RtcpPacketType::from_u8(205), None);
    }

    #[test]
    fn test_write_header_length_field() {
        let mut bytes = Vec::new();
        write_rtcp_header(&mut bytes, RtcpPacketType::RR, 1, 7);
        assert_eq!(bytes, vec![0x81, 201, 0, 7]);

        let header = RtcpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.count, 1);
        assert_eq!(header.packet_size(), 32);
    }

    #[test]
    fn test_packet_body_strips_padding() {
        let data = [0xA0, 203, 0, 2, 1, 2, 3, 4, 0, 0, 0, 4];
        let (header, body) = packet_body(&data).unwrap();
        assert!(header.padding);
        assert_eq!(body, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_packet_body_rejects_overlong_length() {
        let data = [0x80, 201, 0, 5, 0, 0, 0, 1];
        assert!(packet_body(&data).is_err());
    }
}
