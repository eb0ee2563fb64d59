use network::{ReportBlock, SdesItemType};

/// Something the application may want to know about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// First RTP or RTCP packet from an unknown SSRC
    NewSource { ssrc: u32 },
    SenderReport {
        ssrc: u32,
        packet_count: u32,
        octet_count: u32,
    },
    /// `block` is the peer's report about our own stream, if it had one
    ReceiverReport {
        ssrc: u32,
        block: Option<ReportBlock>,
    },
    Sdes {
        ssrc: u32,
        item_type: SdesItemType,
        value: String,
    },
    Bye {
        ssrc: u32,
        reason: Option<String>,
    },
    /// Removed after RTCP silence
    SourceTimedOut { ssrc: u32 },
    /// Received text contained `markers` loss markers
    TextLoss { markers: usize },
}

/// How [`TextSession::stop`](crate::TextSession::stop) ends the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stop every thread without a BYE
    Immediate,
    /// Flush pending text, then leave with an RTCP BYE
    Goodbye(Option<String>),
}
