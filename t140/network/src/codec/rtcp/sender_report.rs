//! RTCP Sender Report implementation

use super::report_block::{ReportBlock, parse_report_blocks};
use super::{RtcpPacketType, finish_rtcp_packet, write_rtcp_header};
use crate::error::{NetworkError, Result};
use crate::utils::read_u32_be;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp: seconds and 2^-32 fractions of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Times before the Unix epoch map to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        let fraction = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
        Self {
            seconds,
            fraction: fraction as u32,
        }
    }

    /// The compact form used in LSR fields.
    pub fn middle_32(&self) -> u32 {
        (self.seconds << 16) | (self.fraction >> 16)
    }
}

/// RTCP Sender Report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp: NtpTimestamp,
    /// RTP timestamp corresponding to `ntp`
    pub rtp_timestamp: u32,
    pub sender_packet_count: u32,
    pub sender_octet_count: u32,
    pub report_blocks: Vec<ReportBlock>,
}

impl SenderReport {
    const SENDER_INFO_SIZE: usize = 20;

    pub fn to_bytes(&self) -> Vec<u8> {
        let blocks = &self.report_blocks[..self.report_blocks.len().min(31)];
        let mut bytes = Vec::with_capacity(28 + blocks.len() * ReportBlock::SIZE);

        write_rtcp_header(&mut bytes, RtcpPacketType::SR, blocks.len(), 0);
        bytes.extend_from_slice(&self.ssrc.to_be_bytes());
        bytes.extend_from_slice(&self.ntp.seconds.to_be_bytes());
        bytes.extend_from_slice(&self.ntp.fraction.to_be_bytes());
        bytes.extend_from_slice(&self.rtp_timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.sender_packet_count.to_be_bytes());
        bytes.extend_from_slice(&self.sender_octet_count.to_be_bytes());
        for block in blocks {
            block.write(&mut bytes);
        }

        finish_rtcp_packet(&mut bytes);
        bytes
    }

    /// Parses an SR from its body (the bytes after the common header).
    pub(crate) fn from_body(count: u8, body: &[u8]) -> Result<Self> {
        if body.len() < 4 + Self::SENDER_INFO_SIZE {
            return Err(NetworkError::Rtcp("SR packet too short".to_string()));
        }
        let word = |offset| read_u32_be(body, offset).unwrap_or(0);

        Ok(Self {
            ssrc: word(0),
            ntp: NtpTimestamp {
                seconds: word(4),
                fraction: word(8),
            },
            rtp_timestamp: word(12),
            sender_packet_count: word(16),
            sender_octet_count: word(20),
            report_blocks: parse_report_blocks(&body[4 + Self::SENDER_INFO_SIZE..], count)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rtcp::packet_body;

    #[test]
    fn test_ntp_timestamp_unix_epoch() {
        let ntp = NtpTimestamp::from_system_time(UNIX_EPOCH);
        assert_eq!(ntp.seconds as u64, NTP_UNIX_OFFSET);
        assert_eq!(ntp.fraction, 0);
    }

    #[test]
    fn test_ntp_fraction_half_second() {
        let ntp = NtpTimestamp::from_system_time(UNIX_EPOCH + Duration::from_millis(500));
        assert_eq!(ntp.fraction, 0x8000_0000);
        assert_eq!(ntp.middle_32() & 0xFFFF, 0x8000);
    }

    #[test]
    fn test_sender_report_wire_size_and_length() {
        let sr = SenderReport {
            ssrc: 12345,
            ntp: NtpTimestamp {
                seconds: 1,
                fraction: 2,
            },
            rtp_timestamp: 160,
            sender_packet_count: 100,
            sender_octet_count: 5000,
            report_blocks: vec![ReportBlock {
                ssrc: 9,
                fraction_lost: 0,
                cumulative_lost: 0,
                extended_highest_seq: 10,
                jitter: 0,
                last_sr: 0,
                delay_since_last_sr: 0,
            }],
        };
        let bytes = sr.to_bytes();

        assert_eq!(bytes.len(), 52);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], RtcpPacketType::SR as u8);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 12);

        let (header, body) = packet_body(&bytes).unwrap();
        let parsed = SenderReport::from_body(header.count, body).unwrap();
        assert_eq!(parsed, sr);
    }

    #[test]
    fn test_sender_report_too_short() {
        assert!(SenderReport::from_body(0, &[0; 20]).is_err());
    }
}
