//! Network Module - RTP text transport
//!
//! Wire-level pieces of an RFC 4103 text session: RTP header codec, RTCP
//! packet codecs, the T.140 packetizer/depacketizer with RED redundancy,
//! the legacy T.140-level redundancy filter and the UDP transport.

pub mod codec;
pub mod transport;

pub mod error;
pub mod utils;

pub use codec::{
    ByePacket, DepacketizerStats, NtpTimestamp, PayloadTypes, ReceiverReport, ReportBlock,
    RtcpPacket, RtcpPacketType, RtpHeader, RtpPacket, RtpTextBuffer, RtpTextDepacketizer,
    RtpTextPacketizer, SdesChunk, SdesItem, SdesItemType, SenderReport, SourceDescription,
    T140RedundancyFilter, LOSS_CHAR, split_utf8,
};
pub use error::NetworkError;
pub use transport::{TransportStats, UdpTransport};

pub type Result<T> = std::result::Result<T, NetworkError>;
