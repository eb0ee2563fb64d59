//! T.140-level redundancy filter
//!
//! An application-layer alternative to RED for peers that cannot use RFC
//! 4103 redundancy. Every outgoing text block is prefixed with a header
//! carrying the last `levels` blocks:
//!
//! ```text
//! SOS 'R'  flag  level  seq(2)  { len(2) data }*level  ST  primary
//! C2 98 52 '0'   '2'    "17"    "03"abc "00"          C2 9C ...
//! ```
//!
//! All numbers are ASCII decimal. `flag` is 1 when the sender also supports
//! RFC 4103 RED, in which case the receiving filter steps aside and only
//! strips the header. Generations are listed oldest first.

use crate::codec::packetizers::t140::LOSS_CHAR;
use crate::error::{NetworkError, Result};
use logging::Logger;
use std::collections::VecDeque;

/// Start of string, ESC-prefixed 'R'.
pub const SOS: &[u8] = &[0xC2, 0x98, b'R'];
/// String terminator.
pub const ST: &[u8] = &[0xC2, 0x9C];

pub const MAX_LEVELS: usize = 9;
pub const MAX_BLOCK_LENGTH: usize = 99;
const SEQ_MOD: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame<'a> {
    rfc4103_supported: bool,
    seq: u8,
    blocks: Vec<&'a [u8]>,
    primary: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub recovered_blocks: u64,
    pub loss_markers: u64,
    pub duplicates: u64,
    pub malformed: u64,
}

pub struct T140RedundancyFilter {
    levels: usize,
    rfc4103_supported: bool,
    /// Previously sent blocks, oldest first
    sent: VecDeque<Vec<u8>>,
    next_seq: u8,
    last_received_seq: Option<u8>,
    stats: FilterStats,
    logger: Logger,
}

impl T140RedundancyFilter {
    /// # Errors
    ///
    /// `levels` above 9 cannot be expressed in the one-digit level field.
    pub fn new(levels: usize, rfc4103_supported: bool, logger: Logger) -> Result<Self> {
        if levels > MAX_LEVELS {
            return Err(NetworkError::Config(format!(
                "T.140 redundancy level {} exceeds {}",
                levels, MAX_LEVELS
            )));
        }
        Ok(Self {
            levels,
            rfc4103_supported,
            sent: VecDeque::with_capacity(levels + 1),
            next_seq: 0,
            last_received_seq: None,
            stats: FilterStats::default(),
            logger,
        })
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Frames `new_data` with the redundancy header.
    ///
    /// # Errors
    ///
    /// Blocks longer than 99 bytes do not fit the two-digit length field.
    pub fn add_redundancy(&mut self, new_data: &[u8]) -> Result<Vec<u8>> {
        if new_data.len() > MAX_BLOCK_LENGTH {
            return Err(NetworkError::Redundancy(format!(
                "T.140 block of {} bytes exceeds {} byte limit",
                new_data.len(),
                MAX_BLOCK_LENGTH
            )));
        }

        let history: usize = self.sent.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(12 + 2 * self.levels + history + new_data.len());
        out.extend_from_slice(SOS);
        out.push(if self.rfc4103_supported { b'1' } else { b'0' });
        out.push(b'0' + self.levels as u8);
        out.extend_from_slice(format!("{:02}", self.next_seq).as_bytes());

        for _ in self.sent.len()..self.levels {
            out.extend_from_slice(b"00");
        }
        for block in &self.sent {
            out.extend_from_slice(format!("{:02}", block.len()).as_bytes());
            out.extend_from_slice(block);
        }
        out.extend_from_slice(ST);
        out.extend_from_slice(new_data);

        if self.levels > 0 {
            self.sent.push_back(new_data.to_vec());
            while self.sent.len() > self.levels {
                self.sent.pop_front();
            }
        }
        self.next_seq = (self.next_seq + 1) % SEQ_MOD;
        self.stats.frames_sent += 1;
        Ok(out)
    }

    /// Recovers text from received data.
    ///
    /// Input without a header passes through unchanged, as does any text in
    /// front of the first header. Several framed blocks may arrive
    /// concatenated when the transport delivers queued packets together.
    /// Losses up to the peer's redundancy level are filled from the
    /// redundant blocks; beyond that one loss marker is emitted per
    /// unrecoverable block, followed by everything the header carries.
    ///
    /// A loss marker directly in front of a header is replaced by the
    /// frame's own gap accounting, so a lost block is never reported twice.
    pub fn filter_input(&mut self, received: &[u8]) -> Vec<u8> {
        let Some(first) = find(received, SOS, 0) else {
            return received.to_vec();
        };
        let (leading, mut carried) = split_trailing_marker(&received[..first]);
        let mut out = leading.to_vec();

        let mut start = first;
        while start < received.len() {
            let next = find(received, SOS, start + SOS.len());
            let end = next.unwrap_or(received.len());
            let (segment, next_carried) = match next {
                Some(_) => split_trailing_marker(&received[start..end]),
                None => (&received[start..end], false),
            };
            self.filter_frame(segment, carried, &mut out);
            carried = next_carried;
            start = end;
        }
        out
    }

    fn filter_frame(&mut self, segment: &[u8], carried: bool, out: &mut Vec<u8>) {
        let Some(frame) = parse_frame(segment) else {
            self.stats.malformed += 1;
            self.logger
                .warn("Malformed T.140 redundancy header, dropping block");
            if carried {
                out.extend_from_slice(LOSS_CHAR);
            }
            return;
        };
        self.stats.frames_received += 1;

        if frame.rfc4103_supported {
            if carried {
                out.extend_from_slice(LOSS_CHAR);
            }
            out.extend_from_slice(frame.primary);
            return;
        }

        let lost = match self.last_received_seq {
            None => 0,
            Some(last) if last == frame.seq => {
                self.stats.duplicates += 1;
                if carried {
                    out.extend_from_slice(LOSS_CHAR);
                }
                return;
            }
            Some(last) => ((frame.seq + SEQ_MOD - last - 1) % SEQ_MOD) as usize,
        };
        self.last_received_seq = Some(frame.seq);

        if carried && lost == 0 {
            out.extend_from_slice(LOSS_CHAR);
        }
        let level = frame.blocks.len();
        if lost > level {
            let markers = lost - level;
            self.logger.warn(&format!(
                "{} T.140 block(s) lost beyond redundancy level {}",
                markers, level
            ));
            for _ in 0..markers {
                out.extend_from_slice(LOSS_CHAR);
            }
            self.stats.loss_markers += markers as u64;
        }
        let recovered = lost.min(level);
        for block in &frame.blocks[level - recovered..] {
            out.extend_from_slice(block);
        }
        self.stats.recovered_blocks += recovered as u64;
        out.extend_from_slice(frame.primary);
    }
}

fn find(data: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|pos| pos + from)
}

/// Splits off one trailing loss marker, if present.
fn split_trailing_marker(data: &[u8]) -> (&[u8], bool) {
    match data.strip_suffix(LOSS_CHAR) {
        Some(rest) => (rest, true),
        None => (data, false),
    }
}

fn parse_frame(data: &[u8]) -> Option<Frame<'_>> {
    let mut pos = SOS.len();
    let flag = digit(data, pos)?;
    let level = digit(data, pos + 1)? as usize;
    let seq = number(data, pos + 2)?;
    pos += 4;

    if flag > 1 || seq >= SEQ_MOD as usize {
        return None;
    }

    let mut blocks = Vec::with_capacity(level);
    for _ in 0..level {
        let len = number(data, pos)?;
        pos += 2;
        blocks.push(data.get(pos..pos + len)?);
        pos += len;
    }

    let rest = data.get(pos..)?;
    let primary = rest.strip_prefix(ST)?;
    Some(Frame {
        rfc4103_supported: flag == 1,
        seq: seq as u8,
        blocks,
        primary,
    })
}

fn digit(data: &[u8], pos: usize) -> Option<u8> {
    data.get(pos)
        .filter(|b| b.is_ascii_digit())
        .map(|b| b - b'0')
}

fn number(data: &[u8], pos: usize) -> Option<usize> {
    Some(digit(data, pos)? as usize * 10 + digit(data, pos + 1)? as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(levels: usize) -> T140RedundancyFilter {
        T140RedundancyFilter::new(levels, false, Logger::discard()).unwrap()
    }

    #[test]
    fn test_frame_layout() {
        let mut tx = filter(2);
        tx.add_redundancy(b"abc").unwrap();
        let framed = tx.add_redundancy(b"de").unwrap();

        let mut expected = SOS.to_vec();
        expected.extend_from_slice(b"0201");
        expected.extend_from_slice(b"00");
        expected.extend_from_slice(b"03abc");
        expected.extend_from_slice(ST);
        expected.extend_from_slice(b"de");
        assert_eq!(framed, expected);
    }

    #[test]
    fn test_in_order_passes_primary() {
        let mut tx = filter(2);
        let mut rx = filter(2);
        let mut out = Vec::new();
        for text in ["he", "ll", "o"] {
            out.extend(rx.filter_input(&tx.add_redundancy(text.as_bytes()).unwrap()));
        }
        assert_eq!(out, b"hello");
        assert_eq!(rx.stats().recovered_blocks, 0);
    }

    #[test]
    fn test_recovers_within_level() {
        let mut tx = filter(2);
        let mut rx = filter(2);
        let frames: Vec<Vec<u8>> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| tx.add_redundancy(t.as_bytes()).unwrap())
            .collect();

        let mut out = rx.filter_input(&frames[0]);
        out.extend(rx.filter_input(&frames[3]));
        assert_eq!(out, b"abcd");
        assert_eq!(rx.stats().recovered_blocks, 2);
    }

    #[test]
    fn test_loss_beyond_level_emits_markers() {
        let mut tx = filter(1);
        let mut rx = filter(1);
        let frames: Vec<Vec<u8>> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|t| tx.add_redundancy(t.as_bytes()).unwrap())
            .collect();

        let mut out = rx.filter_input(&frames[0]);
        out.extend(rx.filter_input(&frames[4]));

        let mut expected = b"a".to_vec();
        expected.extend_from_slice(LOSS_CHAR);
        expected.extend_from_slice(LOSS_CHAR);
        expected.extend_from_slice(b"de");
        assert_eq!(out, expected);
        assert_eq!(rx.stats().loss_markers, 2);
    }

    #[test]
    fn test_sequence_wraps_at_100() {
        let mut tx = filter(1);
        let mut rx = filter(1);
        let mut out = Vec::new();
        for _ in 0..101 {
            out.extend(rx.filter_input(&tx.add_redundancy(b"x").unwrap()));
        }
        assert_eq!(out.len(), 101);
        assert_eq!(rx.stats().loss_markers, 0);
    }

    #[test]
    fn test_duplicate_yields_nothing() {
        let mut tx = filter(1);
        let mut rx = filter(1);
        let frame = tx.add_redundancy(b"x").unwrap();
        assert_eq!(rx.filter_input(&frame), b"x");
        assert!(rx.filter_input(&frame).is_empty());
        assert_eq!(rx.stats().duplicates, 1);
    }

    #[test]
    fn test_defers_to_rfc4103_peer() {
        let mut tx = T140RedundancyFilter::new(1, true, Logger::discard()).unwrap();
        let mut rx = filter(1);
        tx.add_redundancy(b"a").unwrap();
        tx.add_redundancy(b"b").unwrap();
        let third = tx.add_redundancy(b"c").unwrap();

        // two frames lost, but the peer asked us to stay out of the way
        assert_eq!(rx.filter_input(&third), b"c");
        assert_eq!(rx.stats().loss_markers, 0);
    }

    #[test]
    fn test_plain_text_passes_through() {
        let mut rx = filter(2);
        assert_eq!(rx.filter_input(b"plain"), b"plain");
    }

    #[test]
    fn test_malformed_header_dropped() {
        let mut rx = filter(2);
        let mut data = SOS.to_vec();
        data.extend_from_slice(b"0x");
        assert!(rx.filter_input(&data).is_empty());
        assert_eq!(rx.stats().malformed, 1);
    }

    #[test]
    fn test_concatenated_frames_after_plain_text() {
        let mut tx = filter(2);
        let mut rx = filter(2);
        let mut data = b"hi ".to_vec();
        data.extend(tx.add_redundancy(b"a").unwrap());
        data.extend(tx.add_redundancy(b"b").unwrap());

        assert_eq!(rx.filter_input(&data), b"hi ab");
        assert_eq!(rx.stats().frames_received, 2);
        assert_eq!(rx.stats().recovered_blocks, 0);
    }

    #[test]
    fn test_marker_before_recoverable_frame_is_replaced() {
        let mut tx = filter(1);
        let mut rx = filter(1);
        let frames: Vec<Vec<u8>> = ["a", "b", "c"]
            .iter()
            .map(|t| tx.add_redundancy(t.as_bytes()).unwrap())
            .collect();

        let mut data = frames[0].clone();
        data.extend_from_slice(LOSS_CHAR);
        data.extend_from_slice(&frames[2]);

        assert_eq!(rx.filter_input(&data), b"abc");
        assert_eq!(rx.stats().recovered_blocks, 1);
        assert_eq!(rx.stats().loss_markers, 0);
    }

    #[test]
    fn test_marker_before_contiguous_frame_is_kept() {
        let mut tx = filter(1);
        let mut rx = filter(1);
        assert_eq!(rx.filter_input(&tx.add_redundancy(b"a").unwrap()), b"a");

        let mut data = LOSS_CHAR.to_vec();
        data.extend(tx.add_redundancy(b"b").unwrap());

        let mut expected = LOSS_CHAR.to_vec();
        expected.push(b'b');
        assert_eq!(rx.filter_input(&data), expected);
    }

    #[test]
    fn test_limits() {
        assert!(T140RedundancyFilter::new(10, false, Logger::discard()).is_err());
        assert!(filter(1).add_redundancy(&[b'a'; 100]).is_err());
    }
}
