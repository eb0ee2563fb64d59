//! RTCP BYE packet implementation

use super::{RtcpPacketType, finish_rtcp_packet, write_rtcp_header};
use crate::error::{NetworkError, Result};
use crate::utils::{pad_to_word, read_u32_be};

/// RTCP BYE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByePacket {
    /// SSRC(s) leaving
    pub ssrcs: Vec<u32>,
    pub reason: Option<String>,
}

impl ByePacket {
    pub fn new(ssrc: u32, reason: Option<String>) -> Self {
        Self {
            ssrcs: vec![ssrc],
            reason,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let ssrcs = &self.ssrcs[..self.ssrcs.len().min(31)];
        let mut bytes = Vec::with_capacity(4 + ssrcs.len() * 4 + 256);

        write_rtcp_header(&mut bytes, RtcpPacketType::BYE, ssrcs.len(), 0);
        for ssrc in ssrcs {
            bytes.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            let text = truncate_utf8(reason, 255);
            bytes.push(text.len() as u8);
            bytes.extend_from_slice(text.as_bytes());
            pad_to_word(&mut bytes);
        }

        finish_rtcp_packet(&mut bytes);
        bytes
    }

    pub(crate) fn from_body(count: u8, body: &[u8]) -> Result<Self> {
        let ssrcs = (0..count as usize)
            .map(|i| read_u32_be(body, 4 * i))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| NetworkError::Rtcp("BYE packet truncated".to_string()))?;

        let offset = 4 * count as usize;
        let reason = body.get(offset).and_then(|&len| {
            body.get(offset + 1..offset + 1 + len as usize)
                .map(|text| String::from_utf8_lossy(text).into_owned())
        });

        Ok(Self { ssrcs, reason })
    }
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rtcp::packet_body;

    #[test]
    fn test_bye_without_reason() {
        let bytes = ByePacket::new(0x11223344, None).to_bytes();
        assert_eq!(bytes, vec![0x81, 203, 0, 1, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_bye_reason_is_padded() {
        let bye = ByePacket::new(12345, Some("Leaving".to_string()));
        let bytes = bye.to_bytes();

        // header 4 + ssrc 4 + len 1 + 7 text = 16
        assert_eq!(bytes.len(), 16);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 3);

        let (header, body) = packet_body(&bytes).unwrap();
        assert_eq!(ByePacket::from_body(header.count, body).unwrap(), bye);
    }

    #[test]
    fn test_bye_multiple_ssrcs() {
        let bye = ByePacket {
            ssrcs: vec![1, 2, 3],
            reason: Some("x".to_string()),
        };
        let bytes = bye.to_bytes();
        assert_eq!(bytes[0] & 0x1F, 3);
        let (header, body) = packet_body(&bytes).unwrap();
        assert_eq!(ByePacket::from_body(header.count, body).unwrap(), bye);
    }

    #[test]
    fn test_bye_truncated_ssrc_list() {
        assert!(ByePacket::from_body(2, &[0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_long_reason_truncated_on_char_boundary() {
        let reason = "é".repeat(200);
        let bytes = ByePacket::new(1, Some(reason)).to_bytes();
        assert_eq!(bytes[8], 254);
    }
}
