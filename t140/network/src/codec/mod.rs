//! Codec module - RTP/RTCP and text packetization

pub mod packetizers;
pub mod rtcp;
pub mod rtp;
pub mod t140_redundancy;

pub use packetizers::t140::{LOSS_CHAR, split_utf8};
pub use packetizers::{
    DepacketizerStats, PayloadTypes, RtpTextBuffer, RtpTextDepacketizer, RtpTextPacketizer,
};
pub use rtcp::{
    ByePacket, NtpTimestamp, ReceiverReport, ReportBlock, RtcpPacket, RtcpPacketType, SdesChunk,
    SdesItem, SdesItemType, SenderReport, SourceDescription,
};
pub use rtp::{RtpHeader, RtpPacket};
pub use t140_redundancy::T140RedundancyFilter;
