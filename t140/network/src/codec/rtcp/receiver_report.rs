//! RTCP Receiver Report implementation

use super::report_block::{ReportBlock, parse_report_blocks};
use super::{RtcpPacketType, finish_rtcp_packet, write_rtcp_header};
use crate::error::{NetworkError, Result};
use crate::utils::read_u32_be;

/// RTCP Receiver Report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    /// SSRC of the reporter
    pub ssrc: u32,
    pub report_blocks: Vec<ReportBlock>,
}

impl ReceiverReport {
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            report_blocks: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let blocks = &self.report_blocks[..self.report_blocks.len().min(31)];
        let mut bytes = Vec::with_capacity(8 + blocks.len() * ReportBlock::SIZE);

        write_rtcp_header(&mut bytes, RtcpPacketType::RR, blocks.len(), 0);
        bytes.extend_from_slice(&self.ssrc.to_be_bytes());
        for block in blocks {
            block.write(&mut bytes);
        }

        finish_rtcp_packet(&mut bytes);
        bytes
    }

    pub(crate) fn from_body(count: u8, body: &[u8]) -> Result<Self> {
        let ssrc = read_u32_be(body, 0)
            .ok_or_else(|| NetworkError::Rtcp("RR packet too short".to_string()))?;
        Ok(Self {
            ssrc,
            report_blocks: parse_report_blocks(&body[4..], count)?,
        })
    }
}
