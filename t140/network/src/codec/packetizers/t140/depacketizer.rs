//! T.140 RTP Depacketizer Implementation
//!
//! Turns received RTP text packets back into an ordered byte stream.
//!
//! Sequence numbers are tracked as 64-bit extended values so that the
//! 16-bit wrap is invisible to the reordering logic. A packet that opens a
//! gap registers every skipped number as missing with a deadline; a later
//! packet's redundant generations, or the late packet itself, can fill the
//! slot before the deadline. Once the deadline passes the slot holds a loss
//! marker. Both paths insert only if the slot is still empty, so whichever
//! happens first wins.

use super::red::RedPayload;
use super::{PayloadTypes, RtpTextBuffer};
use crate::utils::trim_zeros;
use logging::Logger;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// UTF-8 encoding of U+FFFD REPLACEMENT CHARACTER.
pub const LOSS_CHAR: &[u8] = &[0xEF, 0xBF, 0xBD];

pub const WAIT_FOR_MISSING_PACKET: Duration = Duration::from_millis(500);
pub const WAIT_FOR_MISSING_PACKET_RED: Duration = Duration::from_millis(3000);

const SEQ_MOD: i64 = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Text(Vec<u8>),
    Lost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepacketizerStats {
    pub packets_received: u64,
    /// Missing packets filled from a later packet's redundancy
    pub packets_recovered: u64,
    /// Missing packets whose deadline expired
    pub packets_lost: u64,
    /// Loss markers written to the output
    pub loss_markers: u64,
    pub foreign_ssrc_dropped: u64,
    pub malformed: u64,
}

/// T.140 RTP depacketizer
///
/// Not internally synchronized: `decode` and `expire_missing` must be
/// called under one lock, in arrival order.
pub struct RtpTextDepacketizer {
    payload_types: PayloadTypes,
    loss_wait: Duration,
    bound_ssrc: Option<u32>,
    /// Highest extended sequence number seen
    last_sequence_number: i64,
    /// Last extended sequence number handed to the application
    last_output: i64,
    received: BTreeMap<i64, Slot>,
    missing: BTreeMap<i64, Instant>,
    /// The last delivered slot was a loss marker
    last_delivered_lost: bool,
    stats: DepacketizerStats,
    logger: Logger,
}

impl RtpTextDepacketizer {
    /// `redundancy` selects the longer loss deadline used when the peer is
    /// expected to send redundant generations.
    pub fn new(payload_types: PayloadTypes, redundancy: bool, logger: Logger) -> Self {
        let loss_wait = if redundancy {
            WAIT_FOR_MISSING_PACKET_RED
        } else {
            WAIT_FOR_MISSING_PACKET
        };
        Self::with_loss_wait(payload_types, loss_wait, logger)
    }

    pub fn with_loss_wait(payload_types: PayloadTypes, loss_wait: Duration, logger: Logger) -> Self {
        RtpTextDepacketizer {
            payload_types,
            loss_wait,
            bound_ssrc: None,
            last_sequence_number: 0,
            last_output: 0,
            received: BTreeMap::new(),
            missing: BTreeMap::new(),
            last_delivered_lost: false,
            stats: DepacketizerStats::default(),
            logger,
        }
    }

    /// Processes one received packet and returns whatever text became
    /// deliverable in order. Packets from an SSRC other than the first one
    /// seen are dropped.
    pub fn decode(&mut self, buffer: &RtpTextBuffer, now: Instant) -> Vec<u8> {
        match self.bound_ssrc {
            None => {
                self.bound_ssrc = Some(buffer.ssrc);
                let seq = buffer.sequence_number as i64 + SEQ_MOD;
                self.last_sequence_number = seq - 1;
                self.last_output = self.last_sequence_number;
                self.logger.info(&format!(
                    "Bound to SSRC {:#010x} starting at sequence {}",
                    buffer.ssrc, buffer.sequence_number
                ));
            }
            Some(ssrc) if ssrc != buffer.ssrc => {
                self.stats.foreign_ssrc_dropped += 1;
                self.logger.debug(&format!(
                    "Ignoring packet from SSRC {:#010x}, bound to {:#010x}",
                    buffer.ssrc, ssrc
                ));
                return Vec::new();
            }
            Some(_) => {}
        }
        self.stats.packets_received += 1;

        let generations = self.parse_generations(buffer);
        let seq = self.extend(buffer.sequence_number);

        if seq > self.last_sequence_number {
            for skipped in self.last_sequence_number + 1..seq {
                self.register_missing(skipped, now);
            }
            if seq > self.last_sequence_number + 1 {
                self.logger.debug(&format!(
                    "Gap before sequence {}: {} packet(s) missing",
                    buffer.sequence_number,
                    seq - self.last_sequence_number - 1
                ));
            }
            self.last_sequence_number = seq;

            match generations.first() {
                Some(Some(primary)) => self.store(seq, Slot::Text(primary.clone())),
                _ => self.register_missing(seq, now),
            }
        }

        for (i, generation) in generations.into_iter().enumerate() {
            let target = seq - i as i64;
            let Some(data) = generation else { continue };
            if self.missing.remove(&target).is_some() {
                if i > 0 {
                    self.stats.packets_recovered += 1;
                    self.logger.debug(&format!(
                        "Recovered sequence {} from generation {}",
                        target as u16, i
                    ));
                }
                self.store(target, Slot::Text(data));
            }
        }

        self.deliver()
    }

    /// Converts every missing packet whose deadline has passed into a loss
    /// slot and returns any text that became deliverable.
    pub fn expire_missing(&mut self, now: Instant) -> Vec<u8> {
        let expired: Vec<i64> = self
            .missing
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in expired {
            self.missing.remove(&seq);
            self.stats.packets_lost += 1;
            self.logger
                .warn(&format!("Sequence {} lost, substituting loss marker", seq as u16));
            self.store(seq, Slot::Lost);
        }

        self.deliver()
    }

    /// Earliest pending loss deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.missing.values().min().copied()
    }

    pub fn has_pending(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn pending_missing(&self) -> usize {
        self.missing.len()
    }

    pub fn bound_ssrc(&self) -> Option<u32> {
        self.bound_ssrc
    }

    pub fn stats(&self) -> DepacketizerStats {
        self.stats
    }

    /// Primary first, then generation 1, 2, ... as optional data.
    fn parse_generations(&mut self, buffer: &RtpTextBuffer) -> Vec<Option<Vec<u8>>> {
        let payload = trim_zeros(&buffer.data);

        if buffer.payload_type != self.payload_types.red {
            return vec![Some(payload.to_vec())];
        }

        let red = RedPayload::parse(payload, self.payload_types.t140);
        if !red.warnings.is_empty() {
            self.stats.malformed += 1;
            for warning in &red.warnings {
                self.logger.warn(&format!(
                    "Malformed RED payload in sequence {}: {}",
                    buffer.sequence_number, warning
                ));
            }
        }
        red.generations.into_iter().map(|g| g.data).collect()
    }

    /// Nearest-cycle extension of a 16-bit sequence number.
    fn extend(&self, seq: u16) -> i64 {
        let delta = seq.wrapping_sub(self.last_sequence_number as u16) as i16;
        self.last_sequence_number + delta as i64
    }

    fn register_missing(&mut self, seq: i64, now: Instant) {
        if seq <= self.last_output || self.received.contains_key(&seq) {
            return;
        }
        self.missing.entry(seq).or_insert(now + self.loss_wait);
    }

    fn store(&mut self, seq: i64, slot: Slot) {
        if seq <= self.last_output {
            return;
        }
        self.received.entry(seq).or_insert(slot);
    }

    /// Hands out consecutive slots after `last_output`. A run of loss slots
    /// yields a single marker, also when the run spans several calls.
    fn deliver(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(slot) = self.received.remove(&(self.last_output + 1)) {
            self.last_output += 1;
            match slot {
                Slot::Text(text) => {
                    out.extend_from_slice(&text);
                    self.last_delivered_lost = false;
                }
                Slot::Lost => {
                    if !self.last_delivered_lost {
                        out.extend_from_slice(LOSS_CHAR);
                        self.stats.loss_markers += 1;
                    }
                    self.last_delivered_lost = true;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::packetizers::t140::RtpTextPacketizer;

    const PT: PayloadTypes = PayloadTypes { t140: 98, red: 100 };

    fn depacketizer(redundancy: bool) -> RtpTextDepacketizer {
        RtpTextDepacketizer::new(PT, redundancy, Logger::discard())
    }

    fn plain(seq: u16, text: &str) -> RtpTextBuffer {
        RtpTextBuffer {
            data: text.as_bytes().to_vec(),
            timestamp: seq as u32 * 300,
            sequence_number: seq,
            ssrc: 1,
            marker: false,
            payload_type: PT.t140,
        }
    }

    #[test]
    fn test_single_red_packet_without_history() {
        let mut packetizer = RtpTextPacketizer::new(1, 40, PT, 0);
        let buffer = packetizer.encode(b"AB", 0).unwrap();
        assert_eq!(buffer.data, vec![0x62, b'A', b'B']);

        let mut depacketizer = depacketizer(false);
        assert_eq!(depacketizer.decode(&buffer, Instant::now()), b"AB");
    }

    #[test]
    fn test_in_order_plain_packets() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        assert_eq!(d.decode(&plain(5, "he"), now), b"he");
        assert_eq!(d.decode(&plain(6, "llo"), now), b"llo");
        assert!(!d.has_pending());
    }

    #[test]
    fn test_trailing_zero_padding_is_stripped() {
        let mut d = depacketizer(false);
        let mut buffer = plain(1, "ok");
        buffer.data.extend_from_slice(&[0, 0, 0]);
        assert_eq!(d.decode(&buffer, Instant::now()), b"ok");
    }

    #[test]
    fn test_late_packet_fills_gap_before_deadline() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        assert_eq!(d.decode(&plain(1, "a"), now), b"a");
        assert!(d.decode(&plain(3, "c"), now).is_empty());
        assert_eq!(d.pending_missing(), 1);

        assert_eq!(d.decode(&plain(2, "b"), now), b"bc");
        assert!(!d.has_pending());
    }

    #[test]
    fn test_gap_expires_into_single_marker() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);
        d.decode(&plain(5, "e"), now);
        assert_eq!(d.pending_missing(), 3);
        assert_eq!(d.next_deadline(), Some(now + WAIT_FOR_MISSING_PACKET));

        assert!(d.expire_missing(now + Duration::from_millis(499)).is_empty());

        let out = d.expire_missing(now + WAIT_FOR_MISSING_PACKET);
        let mut expected = LOSS_CHAR.to_vec();
        expected.push(b'e');
        assert_eq!(out, expected);
        assert_eq!(d.stats().packets_lost, 3);
        assert_eq!(d.stats().loss_markers, 1);
    }

    #[test]
    fn test_packet_after_expiry_is_ignored() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);
        d.decode(&plain(3, "c"), now);
        d.expire_missing(now + WAIT_FOR_MISSING_PACKET);

        assert!(d.decode(&plain(2, "b"), now + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_duplicate_is_ignored() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);
        assert!(d.decode(&plain(1, "a"), now).is_empty());
    }

    #[test]
    fn test_wraparound_is_in_order() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        assert_eq!(d.decode(&plain(65534, "x"), now), b"x");
        assert_eq!(d.decode(&plain(65535, "y"), now), b"y");
        assert_eq!(d.decode(&plain(0, "z"), now), b"z");
        assert_eq!(d.decode(&plain(1, "!"), now), b"!");
        assert!(!d.has_pending());
    }

    #[test]
    fn test_foreign_ssrc_ignored() {
        let mut d = depacketizer(false);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);

        let mut other = plain(2, "b");
        other.ssrc = 99;
        assert!(d.decode(&other, now).is_empty());
        assert_eq!(d.stats().foreign_ssrc_dropped, 1);
        assert_eq!(d.bound_ssrc(), Some(1));
    }

    #[test]
    fn test_redundancy_recovers_single_loss() {
        let mut packetizer = RtpTextPacketizer::new(1, 100, PT, 2);
        let packets: Vec<RtpTextBuffer> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, t)| packetizer.encode(t.as_bytes(), i as u32 * 300).unwrap())
            .collect();

        let mut d = depacketizer(true);
        let now = Instant::now();
        let mut out = d.decode(&packets[0], now);
        out.extend(d.decode(&packets[2], now));
        out.extend(d.decode(&packets[3], now));

        assert_eq!(out, b"abcd");
        assert_eq!(d.stats().packets_recovered, 1);
        assert!(!d.has_pending());
    }

    #[test]
    fn test_packet_before_first_is_ignored() {
        let mut packetizer = RtpTextPacketizer::new(1, 7, PT, 2);
        let packets: Vec<RtpTextBuffer> = ["x", "y", "z"]
            .iter()
            .enumerate()
            .map(|(i, t)| packetizer.encode(t.as_bytes(), i as u32 * 300).unwrap())
            .collect();

        let mut d = depacketizer(true);
        let now = Instant::now();
        let mut out = d.decode(&packets[1], now);
        out.extend(d.decode(&packets[0], now));
        out.extend(d.decode(&packets[2], now));

        // packet 1 binds the stream, so packet 0 is older than the start
        assert_eq!(out, b"yz");
        assert_eq!(d.stats().packets_recovered, 0);
        assert!(!d.has_pending());
    }

    #[test]
    fn test_red_loss_wait_is_longer() {
        let mut d = depacketizer(true);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);
        d.decode(&plain(3, "c"), now);
        assert_eq!(d.next_deadline(), Some(now + WAIT_FOR_MISSING_PACKET_RED));
        assert!(d.expire_missing(now + WAIT_FOR_MISSING_PACKET).is_empty());
    }

    #[test]
    fn test_malformed_primary_registers_own_sequence() {
        let mut d = depacketizer(true);
        let now = Instant::now();
        d.decode(&plain(1, "a"), now);

        let broken = RtpTextBuffer {
            data: vec![0x80 | 98, 0x00],
            payload_type: PT.red,
            ..plain(2, "")
        };
        assert!(d.decode(&broken, now).is_empty());
        assert_eq!(d.pending_missing(), 1);
        assert_eq!(d.stats().malformed, 1);

        assert_eq!(d.decode(&plain(2, "b"), now), b"b");
    }

    #[test]
    fn test_loss_runs_across_calls_collapse() {
        let mut d = depacketizer(true);
        let t0 = Instant::now();
        d.decode(&plain(1, "a"), t0);

        let broken = RtpTextBuffer {
            data: vec![0x80 | 98],
            payload_type: PT.red,
            ..plain(2, "")
        };
        d.decode(&broken, t0);
        d.decode(&plain(4, "d"), t0 + Duration::from_millis(300));

        let first = d.expire_missing(t0 + WAIT_FOR_MISSING_PACKET_RED);
        assert_eq!(first, LOSS_CHAR);
        assert_eq!(d.pending_missing(), 1);

        let second =
            d.expire_missing(t0 + WAIT_FOR_MISSING_PACKET_RED + Duration::from_millis(300));
        assert_eq!(second, b"d");
        assert_eq!(d.stats().packets_lost, 2);
        assert_eq!(d.stats().loss_markers, 1);
    }
}
