//! Per-participant reception statistics
//!
//! Sequence tracking follows RFC 3550 Appendix A.1 (with no probation),
//! loss accounting A.3 and interarrival jitter A.8.

use network::{ReportBlock, SdesItem, SdesItemType, SenderReport};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const RTP_SEQ_MOD: u32 = 1 << 16;
const MAX_DROPOUT: u32 = 3000;
const MAX_MISORDER: u32 = 100;

/// Sequence state from RFC 3550 A.1
#[derive(Debug, Clone, Default)]
struct SeqState {
    max_seq: u16,
    /// Shifted count of wraparounds
    cycles: u32,
    base_seq: u32,
    bad_seq: u32,
    received: u32,
    expected_prior: u32,
    received_prior: u32,
}

impl SeqState {
    fn init(seq: u16) -> Self {
        Self {
            max_seq: seq,
            base_seq: seq as u32,
            bad_seq: RTP_SEQ_MOD + 1,
            ..Self::default()
        }
    }

    /// Returns false for a packet that looks like a jump; a second packet
    /// continuing the jump restarts the sequence.
    fn update(&mut self, seq: u16) -> bool {
        let udelta = seq.wrapping_sub(self.max_seq) as u32;

        if udelta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles = self.cycles.wrapping_add(RTP_SEQ_MOD);
            }
            self.max_seq = seq;
        } else if udelta <= RTP_SEQ_MOD - MAX_MISORDER {
            if seq as u32 == self.bad_seq {
                *self = Self::init(seq);
            } else {
                self.bad_seq = (seq as u32 + 1) & (RTP_SEQ_MOD - 1);
                return false;
            }
        }
        // else: duplicate or reordered, counted below
        self.received = self.received.wrapping_add(1);
        true
    }

    fn extended_max(&self) -> u32 {
        self.cycles.wrapping_add(self.max_seq as u32)
    }

    fn expected(&self) -> u32 {
        self.extended_max().wrapping_sub(self.base_seq).wrapping_add(1)
    }

    fn cumulative_lost(&self) -> i32 {
        let lost = self.expected() as i64 - self.received as i64;
        lost.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// A.3 fraction for the interval since the previous call.
    fn fraction_lost(&mut self) -> u8 {
        let expected = self.expected();
        let expected_interval = expected.wrapping_sub(self.expected_prior);
        self.expected_prior = expected;
        let received_interval = self.received.wrapping_sub(self.received_prior);
        self.received_prior = self.received;

        let lost_interval = expected_interval as i64 - received_interval as i64;
        if expected_interval == 0 || lost_interval <= 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval as i64).min(255) as u8
        }
    }
}

/// An RTP/RTCP participant as seen from this session.
#[derive(Debug, Clone)]
pub struct Source {
    ssrc: u32,
    local: bool,
    sdes: BTreeMap<SdesItemType, String>,
    seq: Option<SeqState>,
    /// A.8 state
    transit: Option<i32>,
    jitter: f64,
    packets_received: u64,
    octets_received: u64,
    /// Middle 32 bits of the last SR NTP timestamp and when it arrived
    last_sr: Option<(u32, Instant)>,
    /// Packet and octet counts from the last SR
    sender_counts: Option<(u32, u32)>,
    last_rtp: Option<Instant>,
    last_rtcp: Instant,
    active_sender: bool,
}

impl Source {
    /// A remote participant first heard at `now`.
    pub fn new(ssrc: u32, now: Instant) -> Self {
        Self {
            ssrc,
            local: false,
            sdes: BTreeMap::new(),
            seq: None,
            transit: None,
            jitter: 0.0,
            packets_received: 0,
            octets_received: 0,
            last_sr: None,
            sender_counts: None,
            last_rtp: None,
            last_rtcp: now,
            active_sender: false,
        }
    }

    /// The session's own entry. Never aged out.
    pub fn local(ssrc: u32, now: Instant) -> Self {
        Self {
            local: true,
            ..Self::new(ssrc, now)
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Records an RTP packet. `arrival` is the arrival time expressed in
    /// RTP timestamp units of the same clock rate as `rtp_timestamp`.
    ///
    /// Returns false when the sequence number was rejected as a jump.
    pub fn on_rtp(
        &mut self,
        sequence_number: u16,
        rtp_timestamp: u32,
        arrival: u32,
        payload_len: usize,
        now: Instant,
    ) -> bool {
        self.last_rtp = Some(now);
        self.active_sender = true;

        let valid = match self.seq.as_mut() {
            Some(seq) => seq.update(sequence_number),
            None => {
                let mut seq = SeqState::init(sequence_number);
                seq.received = 1;
                self.seq = Some(seq);
                true
            }
        };
        if !valid {
            return false;
        }

        self.packets_received += 1;
        self.octets_received += payload_len as u64;

        let transit = arrival.wrapping_sub(rtp_timestamp) as i32;
        if let Some(previous) = self.transit {
            let d = transit.wrapping_sub(previous).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.transit = Some(transit);
        true
    }

    pub fn on_sender_report(&mut self, report: &SenderReport, now: Instant) {
        self.last_sr = Some((report.ntp.middle_32(), now));
        self.sender_counts = Some((report.sender_packet_count, report.sender_octet_count));
        self.last_rtcp = now;
    }

    pub fn on_rtcp(&mut self, now: Instant) {
        self.last_rtcp = now;
    }

    pub fn set_sdes(&mut self, item: &SdesItem) {
        if item.item_type != SdesItemType::End {
            self.sdes.insert(item.item_type, item.text());
        }
    }

    pub fn sdes(&self, item_type: SdesItemType) -> Option<&str> {
        self.sdes.get(&item_type).map(String::as_str)
    }

    pub fn cname(&self) -> Option<&str> {
        self.sdes(SdesItemType::Cname)
    }

    /// Builds the reception report for this source and starts a new loss
    /// interval. `None` until RTP has been received from it.
    pub fn report_block(&mut self, now: Instant) -> Option<ReportBlock> {
        let seq = self.seq.as_mut()?;
        let fraction_lost = seq.fraction_lost();

        let (last_sr, delay_since_last_sr) = match self.last_sr {
            Some((middle, arrived)) => (middle, to_ntp_short(now.saturating_duration_since(arrived))),
            None => (0, 0),
        };

        Some(ReportBlock {
            ssrc: self.ssrc,
            fraction_lost,
            cumulative_lost: seq.cumulative_lost(),
            extended_highest_seq: seq.extended_max(),
            jitter: self.jitter(),
            last_sr,
            delay_since_last_sr,
        })
    }

    /// Interarrival jitter in timestamp units
    pub fn jitter(&self) -> u32 {
        self.jitter as u32
    }

    pub fn expected_packets(&self) -> u32 {
        self.seq.as_ref().map_or(0, SeqState::expected)
    }

    pub fn cumulative_lost(&self) -> i32 {
        self.seq.as_ref().map_or(0, SeqState::cumulative_lost)
    }

    pub fn extended_highest_seq(&self) -> Option<u32> {
        self.seq.as_ref().map(SeqState::extended_max)
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn octets_received(&self) -> u64 {
        self.octets_received
    }

    /// Packet and octet counts announced in the last SR
    pub fn sender_counts(&self) -> Option<(u32, u32)> {
        self.sender_counts
    }

    pub fn last_rtp(&self) -> Option<Instant> {
        self.last_rtp
    }

    /// Last RTCP packet, or creation time if none arrived yet
    pub fn last_rtcp(&self) -> Instant {
        self.last_rtcp
    }

    pub fn is_sender(&self) -> bool {
        self.active_sender
    }

    pub fn set_sender(&mut self, active: bool) {
        self.active_sender = active;
    }
}

/// Duration in units of 1/65536 s
fn to_ntp_short(duration: Duration) -> u32 {
    let units = duration.as_secs_f64() * 65536.0;
    units.min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use network::NtpTimestamp;

    fn receive(source: &mut Source, seqs: &[u16], now: Instant) {
        for &seq in seqs {
            source.on_rtp(seq, seq as u32 * 300, seq as u32 * 300, 10, now);
        }
    }

    #[test]
    fn test_no_loss() {
        let now = Instant::now();
        let mut source = Source::new(1, now);
        receive(&mut source, &[10, 11, 12, 13], now);

        let block = source.report_block(now).unwrap();
        assert_eq!(block.fraction_lost, 0);
        assert_eq!(block.cumulative_lost, 0);
        assert_eq!(block.extended_highest_seq, 13);
        assert_eq!(source.octets_received(), 40);
        assert!(source.is_sender());
    }

    #[test]
    fn test_loss_fraction_per_interval() {
        let now = Instant::now();
        let mut source = Source::new(1, now);
        receive(&mut source, &[0, 1, 3], now);

        let block = source.report_block(now).unwrap();
        assert_eq!(block.cumulative_lost, 1);
        // 1 of 4 expected
        assert_eq!(block.fraction_lost, 64);

        receive(&mut source, &[4, 5, 6, 7], now);
        let block = source.report_block(now).unwrap();
        assert_eq!(block.fraction_lost, 0);
        assert_eq!(block.cumulative_lost, 1);
    }

    #[test]
    fn test_wraparound_counts_cycle() {
        let now = Instant::now();
        let mut source = Source::new(1, now);
        receive(&mut source, &[65534, 65535, 0, 1], now);

        assert_eq!(source.extended_highest_seq(), Some(65536 + 1));
        assert_eq!(source.cumulative_lost(), 0);
    }

    #[test]
    fn test_large_jump_needs_confirmation() {
        let now = Instant::now();
        let mut source = Source::new(1, now);
        receive(&mut source, &[100], now);

        assert!(!source.on_rtp(20_000, 0, 0, 1, now));
        assert!(source.on_rtp(20_001, 0, 0, 1, now));
        assert_eq!(source.extended_highest_seq(), Some(20_001));
        assert_eq!(source.cumulative_lost(), 0);
    }

    #[test]
    fn test_jitter_tracks_transit_changes() {
        let now = Instant::now();
        let mut source = Source::new(1, now);
        source.on_rtp(1, 1000, 5000, 1, now);
        source.on_rtp(2, 1300, 5300, 1, now);
        assert_eq!(source.jitter(), 0);

        source.on_rtp(3, 1600, 5760, 1, now);
        // |160| / 16
        assert_eq!(source.jitter(), 10);
    }

    #[test]
    fn test_report_block_carries_lsr() {
        let now = Instant::now();
        let mut source = Source::new(7, now);
        receive(&mut source, &[1], now);

        let report = SenderReport {
            ssrc: 7,
            ntp: NtpTimestamp {
                seconds: 0x0001_2345,
                fraction: 0x6789_0000,
            },
            rtp_timestamp: 0,
            sender_packet_count: 3,
            sender_octet_count: 30,
            report_blocks: Vec::new(),
        };
        source.on_sender_report(&report, now);

        let block = source
            .report_block(now + Duration::from_secs(2))
            .unwrap();
        assert_eq!(block.last_sr, 0x2345_6789);
        assert_eq!(block.delay_since_last_sr, 2 * 65536);
        assert_eq!(source.sender_counts(), Some((3, 30)));
    }

    #[test]
    fn test_no_block_without_rtp() {
        let now = Instant::now();
        let mut source = Source::local(5, now);
        assert!(source.is_local());
        assert!(source.report_block(now).is_none());
    }

    #[test]
    fn test_sdes_items() {
        let mut source = Source::new(1, Instant::now());
        source.set_sdes(&SdesItem::new(SdesItemType::Cname, "bob@example.org"));
        source.set_sdes(&SdesItem::new(SdesItemType::Name, "Bob"));
        assert_eq!(source.cname(), Some("bob@example.org"));
        assert_eq!(source.sdes(SdesItemType::Name), Some("Bob"));
        assert_eq!(source.sdes(SdesItemType::Email), None);
    }
}
