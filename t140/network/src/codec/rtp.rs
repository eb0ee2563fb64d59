//! RTP packet structure and serialization
//!
//! This module implements the fixed header of RFC 3550 (RTP: A Transport
//! Protocol for Real-Time Applications) as used by RFC 4103 text streams.
//!
//! # RTP Header Format (RFC 3550 Section 5.1)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           SSRC (Synchronization Source)                       |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            CSRC list (0-15 items, 32 bits each)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Text streams use a 1000 Hz timestamp clock (RFC 4103 Section 3).
//!
//! # Example
//!
//! ```rust
//! use network::codec::rtp::{RtpHeader, RtpPacket};
//!
//! let mut header = RtpHeader::new(98, 0x1234_5678);
//! header.sequence_number = 100;
//! header.timestamp = 1500;
//! header.marker = true;
//!
//! let packet = RtpPacket::new(header, b"hello".to_vec());
//! let bytes = packet.to_bytes();
//!
//! let decoded = RtpPacket::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded.payload, b"hello");
//! ```

use crate::error::{NetworkError, Result};
use crate::utils::{read_u16_be, read_u32_be};

pub const RTP_VERSION: u8 = 2;

/// RTP packet header according to RFC 3550.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    /// Set on received packets that carried padding. Never written.
    pub padding: bool,
    /// Set on received packets that carried a header extension. Never written.
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    /// Milliseconds for text streams
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
}

impl RtpHeader {
    /// Fixed part of the header in bytes.
    pub const HEADER_SIZE: usize = 12;

    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        RtpHeader {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence_number: 0,
            timestamp: 0,
            ssrc,
            csrcs: Vec::new(),
        }
    }

    /// Serialized size including the CSRC list.
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + 4 * self.csrcs.len()
    }

    /// Serializes the header. Padding and extension are never emitted, and
    /// at most 15 CSRCs are written.
    pub fn to_bytes(&self) -> Vec<u8> {
        let csrcs = &self.csrcs[..self.csrcs.len().min(15)];
        let mut bytes = Vec::with_capacity(Self::HEADER_SIZE + 4 * csrcs.len());

        // V(2) + P(1) + X(1) + CC(4)
        bytes.push((self.version << 6) | csrcs.len() as u8);
        // M(1) + PT(7)
        bytes.push(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        bytes.extend_from_slice(&self.sequence_number.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in csrcs {
            bytes.extend_from_slice(&csrc.to_be_bytes());
        }

        bytes
    }

    /// Parses the fixed header and CSRC list.
    ///
    /// Fails on a version other than 2 or when the CSRC list is truncated.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(NetworkError::Rtp(format!(
                "Header too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(NetworkError::Rtp(format!("Unsupported RTP version {}", version)));
        }
        let padding = (data[0] >> 5) & 0x01 == 1;
        let extension = (data[0] >> 4) & 0x01 == 1;
        let csrc_count = (data[0] & 0x0F) as usize;

        let marker = data[1] >> 7 == 1;
        let payload_type = data[1] & 0x7F;

        let truncated = || NetworkError::Rtp("Header truncated".to_string());
        let sequence_number = read_u16_be(data, 2).ok_or_else(truncated)?;
        let timestamp = read_u32_be(data, 4).ok_or_else(truncated)?;
        let ssrc = read_u32_be(data, 8).ok_or_else(truncated)?;

        let csrcs = (0..csrc_count)
            .map(|i| read_u32_be(data, Self::HEADER_SIZE + 4 * i))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| NetworkError::Rtp("CSRC list truncated".to_string()))?;

        Ok(RtpHeader {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
        })
    }
}

/// Complete RTP Packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        RtpPacket { header, payload }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses a datagram, skipping any header extension and removing
    /// padding so `payload` holds only the media bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = RtpHeader::from_bytes(data)?;
        let mut start = header.size();

        if header.extension {
            let words = read_u16_be(data, start + 2)
                .ok_or_else(|| NetworkError::Rtp("Extension header truncated".to_string()))?;
            start += 4 + 4 * words as usize;
            if start > data.len() {
                return Err(NetworkError::Rtp("Extension body truncated".to_string()));
            }
        }

        let mut end = data.len();
        if header.padding {
            let pad = data.get(end.wrapping_sub(1)).copied().unwrap_or(0) as usize;
            if pad == 0 || start + pad > end {
                return Err(NetworkError::Rtp(format!("Invalid padding count {}", pad)));
            }
            end -= pad;
        }

        Ok(RtpPacket {
            payload: data[start..end].to_vec(),
            header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_header_layout() {
        let mut header = RtpHeader::new(98, 0x0102_0304);
        header.sequence_number = 0xABCD;
        header.timestamp = 1000;
        header.marker = true;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 0x80 | 98);
        assert_eq!(&bytes[2..4], &[0xAB, 0xCD]);
        assert_eq!(&bytes[4..8], &1000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_rtp_header_new_masks_payload_type() {
        let header = RtpHeader::new(0xFF, 1);
        assert_eq!(header.payload_type, 0x7F);
    }

    #[test]
    fn test_rtp_header_from_bytes_short() {
        let result = RtpHeader::from_bytes(&[0x80, 0x62, 0x12, 0x34]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rtp_header_rejects_version_one() {
        let mut bytes = RtpHeader::new(98, 1).to_bytes();
        bytes[0] = 0x40;
        assert!(matches!(RtpHeader::from_bytes(&bytes), Err(NetworkError::Rtp(_))));
    }

    #[test]
    fn test_rtp_header_with_csrcs() {
        let mut header = RtpHeader::new(100, 7);
        header.csrcs = vec![11, 22];

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytes[0] & 0x0F, 2);

        let decoded = RtpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.csrcs, vec![11, 22]);
        assert_eq!(decoded.size(), 20);
    }

    #[test]
    fn test_rtp_header_truncated_csrc_list() {
        let mut bytes = RtpHeader::new(100, 7).to_bytes();
        bytes[0] |= 0x03;
        bytes.extend_from_slice(&[0, 0, 0, 1]);
        assert!(RtpHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rtp_packet_payload_follows_header() {
        let packet = RtpPacket::new(RtpHeader::new(98, 1000), vec![10, 20, 30]);
        let bytes = packet.to_bytes();
        assert_eq!(&bytes[12..], &[10, 20, 30]);

        let decoded = RtpPacket::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_rtp_packet_strips_padding() {
        let mut bytes = RtpPacket::new(RtpHeader::new(98, 1), b"abc".to_vec()).to_bytes();
        bytes[0] |= 0x20;
        bytes.extend_from_slice(&[0, 0, 0, 4]);

        let decoded = RtpPacket::from_bytes(&bytes).unwrap();
        assert!(decoded.header.padding);
        assert_eq!(decoded.payload, b"abc");
    }

    #[test]
    fn test_rtp_packet_rejects_oversized_padding() {
        let mut bytes = RtpPacket::new(RtpHeader::new(98, 1), b"a".to_vec()).to_bytes();
        bytes[0] |= 0x20;
        bytes.push(40);
        assert!(RtpPacket::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rtp_packet_skips_extension() {
        let mut bytes = RtpHeader::new(98, 1).to_bytes();
        bytes[0] |= 0x10;
        // profile 0xBEDE, one word of extension data
        bytes.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4]);
        bytes.extend_from_slice(b"text");

        let decoded = RtpPacket::from_bytes(&bytes).unwrap();
        assert!(decoded.header.extension);
        assert_eq!(decoded.payload, b"text");
    }

    #[test]
    fn test_rtp_packet_empty_payload() {
        let bytes = RtpPacket::new(RtpHeader::new(98, 1000), vec![]).to_bytes();
        assert_eq!(bytes.len(), 12);
        assert!(RtpPacket::from_bytes(&bytes).unwrap().payload.is_empty());
    }

    #[test]
    fn test_sequence_number_and_timestamp_extremes() {
        let mut header = RtpHeader::new(98, 1000);
        header.sequence_number = u16::MAX;
        header.timestamp = u32::MAX;

        let decoded = RtpHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded.sequence_number, u16::MAX);
        assert_eq!(decoded.timestamp, u32::MAX);
    }
}
