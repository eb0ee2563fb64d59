//! Compound RTCP packets
//!
//! Validation follows RFC 3550 Appendix A.2: every sub-packet is version 2,
//! only the last may be padded, the first is SR or RR, and the length fields
//! add up to exactly the datagram size. APP and unknown packet types are
//! skipped by length, and so is a known packet whose body does not parse.

use super::{
    ByePacket, RTCP_VERSION, ReceiverReport, RtcpPacketType, SenderReport, SourceDescription,
    packet_body,
};
use crate::error::{NetworkError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Bye(ByePacket),
}

impl RtcpPacket {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RtcpPacket::SenderReport(sr) => sr.to_bytes(),
            RtcpPacket::ReceiverReport(rr) => rr.to_bytes(),
            RtcpPacket::SourceDescription(sdes) => sdes.to_bytes(),
            RtcpPacket::Bye(bye) => bye.to_bytes(),
        }
    }

    pub fn packet_type(&self) -> RtcpPacketType {
        match self {
            RtcpPacket::SenderReport(_) => RtcpPacketType::SR,
            RtcpPacket::ReceiverReport(_) => RtcpPacketType::RR,
            RtcpPacket::SourceDescription(_) => RtcpPacketType::SDES,
            RtcpPacket::Bye(_) => RtcpPacketType::BYE,
        }
    }
}

/// Sub-packets decoded from one datagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundPacket {
    pub packets: Vec<RtcpPacket>,
    /// One entry per sub-packet skipped because its body was malformed
    pub warnings: Vec<String>,
}

pub fn build_compound(packets: &[RtcpPacket]) -> Vec<u8> {
    packets.iter().flat_map(|p| p.to_bytes()).collect()
}

/// Validates and decodes a compound packet.
///
/// # Errors
///
/// Framing problems (length, version, padding placement, a first packet
/// that is not SR or RR) reject the whole datagram. A sub-packet whose body
/// fails to parse is left out and reported in
/// [`CompoundPacket::warnings`].
pub fn parse_compound(data: &[u8]) -> Result<CompoundPacket> {
    if data.is_empty() || data.len() % 4 != 0 {
        return Err(NetworkError::Rtcp(format!(
            "Compound length {} is not a positive multiple of 4",
            data.len()
        )));
    }

    let mut compound = CompoundPacket::default();
    let mut offset = 0;

    while offset < data.len() {
        let (header, body) = packet_body(&data[offset..])?;
        let size = header.packet_size();
        let is_last = offset + size == data.len();

        if header.version != RTCP_VERSION {
            return Err(NetworkError::Rtcp(format!(
                "Unsupported RTCP version {}",
                header.version
            )));
        }
        if header.padding && !is_last {
            return Err(NetworkError::Rtcp(
                "Padding set on a non-final packet".to_string(),
            ));
        }

        let packet_type = RtcpPacketType::from_u8(header.packet_type);
        if offset == 0 && !matches!(packet_type, Some(RtcpPacketType::SR | RtcpPacketType::RR)) {
            return Err(NetworkError::Rtcp(format!(
                "Compound starts with packet type {}",
                header.packet_type
            )));
        }

        let parsed = match packet_type {
            Some(RtcpPacketType::SR) => {
                SenderReport::from_body(header.count, body).map(RtcpPacket::SenderReport)
            }
            Some(RtcpPacketType::RR) => {
                ReceiverReport::from_body(header.count, body).map(RtcpPacket::ReceiverReport)
            }
            Some(RtcpPacketType::SDES) => {
                SourceDescription::from_body(header.count, body).map(RtcpPacket::SourceDescription)
            }
            Some(RtcpPacketType::BYE) => ByePacket::from_body(header.count, body).map(RtcpPacket::Bye),
            Some(RtcpPacketType::APP) | None => {
                offset += size;
                continue;
            }
        };

        match parsed {
            Ok(packet) => compound.packets.push(packet),
            Err(e) => compound.warnings.push(format!(
                "skipped packet type {} at offset {}: {}",
                header.packet_type, offset, e
            )),
        }
        offset += size;
    }

    Ok(compound)
}
