//! Reception report block shared by SR and RR

use crate::error::{NetworkError, Result};
use crate::utils::read_u32_be;

/// Report block (used in SR and RR)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportBlock {
    /// SSRC of the source being reported on
    pub ssrc: u32,
    /// Fraction lost since the previous report, fixed point /256
    pub fraction_lost: u8,
    /// Signed 24-bit cumulative loss
    pub cumulative_lost: i32,
    pub extended_highest_seq: u32,
    /// Interarrival jitter in timestamp units
    pub jitter: u32,
    /// Middle 32 bits of the last SR NTP timestamp
    pub last_sr: u32,
    /// Units of 1/65536 s
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    pub const SIZE: usize = 24;

    const LOST_MAX: i32 = 0x7F_FFFF;
    const LOST_MIN: i32 = -0x80_0000;

    pub(crate) fn write(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.ssrc.to_be_bytes());
        bytes.push(self.fraction_lost);

        let lost = self.cumulative_lost.clamp(Self::LOST_MIN, Self::LOST_MAX);
        bytes.extend_from_slice(&lost.to_be_bytes()[1..4]);

        bytes.extend_from_slice(&self.extended_highest_seq.to_be_bytes());
        bytes.extend_from_slice(&self.jitter.to_be_bytes());
        bytes.extend_from_slice(&self.last_sr.to_be_bytes());
        bytes.extend_from_slice(&self.delay_since_last_sr.to_be_bytes());
    }

    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(NetworkError::Rtcp("Report block too short".to_string()));
        }

        // Sign-extend the 24-bit loss counter.
        let cumulative_lost = i32::from_be_bytes([data[5], data[6], data[7], 0]) >> 8;
        let word = |offset| read_u32_be(data, offset).unwrap_or(0);

        Ok(Self {
            ssrc: word(0),
            fraction_lost: data[4],
            cumulative_lost,
            extended_highest_seq: word(8),
            jitter: word(12),
            last_sr: word(16),
            delay_since_last_sr: word(20),
        })
    }
}

/// Parses `count` consecutive blocks starting at `data[0]`.
pub(crate) fn parse_report_blocks(data: &[u8], count: u8) -> Result<Vec<ReportBlock>> {
    (0..count as usize)
        .map(|i| {
            let start = i * ReportBlock::SIZE;
            data.get(start..start + ReportBlock::SIZE)
                .ok_or_else(|| NetworkError::Rtcp(format!("Report block {} truncated", i)))
                .and_then(ReportBlock::from_bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lost: i32) -> ReportBlock {
        ReportBlock {
            ssrc: 0xCAFE,
            fraction_lost: 64,
            cumulative_lost: lost,
            extended_highest_seq: 0x0001_0005,
            jitter: 12,
            last_sr: 0x1234_5678,
            delay_since_last_sr: 65536,
        }
    }

    #[test]
    fn test_report_block_size() {
        let mut bytes = Vec::new();
        block(3).write(&mut bytes);
        assert_eq!(bytes.len(), ReportBlock::SIZE);
        assert_eq!(&bytes[5..8], &[0, 0, 3]);
    }

    #[test]
    fn test_negative_cumulative_lost_survives() {
        let mut bytes = Vec::new();
        block(-2).write(&mut bytes);
        assert_eq!(&bytes[5..8], &[0xFF, 0xFF, 0xFE]);
        assert_eq!(ReportBlock::from_bytes(&bytes).unwrap().cumulative_lost, -2);
    }

    #[test]
    fn test_cumulative_lost_is_clamped() {
        let mut bytes = Vec::new();
        block(i32::MAX).write(&mut bytes);
        assert_eq!(ReportBlock::from_bytes(&bytes).unwrap().cumulative_lost, 0x7F_FFFF);
    }

    #[test]
    fn test_parse_report_blocks_truncated() {
        let mut bytes = Vec::new();
        block(0).write(&mut bytes);
        assert_eq!(parse_report_blocks(&bytes, 1).unwrap().len(), 1);
        assert!(parse_report_blocks(&bytes, 2).is_err());
    }
}
