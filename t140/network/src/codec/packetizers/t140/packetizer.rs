//! T.140 RTP Packetizer Implementation
//!
//! Implements the sending side of RFC 4103. Each call to
//! [`RtpTextPacketizer::encode`] produces one RED payload carrying the new
//! text as primary plus up to N earlier payloads as redundant generations.

use super::red::{MAX_BLOCK_LENGTH, MAX_TIMESTAMP_OFFSET, RedBlockHeader};
use super::{PayloadTypes, RtpTextBuffer};
use crate::error::{NetworkError, Result};
use rand::Rng;
use std::collections::VecDeque;

/// T.140 RTP packetizer
pub struct RtpTextPacketizer {
    ssrc: u32,
    /// Next sequence number to assign
    sequence_number: u16,
    payload_types: PayloadTypes,
    /// Redundant generations carried per packet
    generations: usize,
    /// Previously sent (timestamp, text), oldest first
    history: VecDeque<(u32, Vec<u8>)>,
}

impl RtpTextPacketizer {
    pub fn new(
        ssrc: u32,
        initial_sequence: u16,
        payload_types: PayloadTypes,
        generations: usize,
    ) -> Self {
        RtpTextPacketizer {
            ssrc,
            sequence_number: initial_sequence,
            payload_types,
            generations,
            history: VecDeque::with_capacity(generations + 1),
        }
    }

    /// Packetizer with a random SSRC and initial sequence number drawn from
    /// the caller's generator.
    pub fn with_random_start<R: Rng>(
        rng: &mut R,
        payload_types: PayloadTypes,
        generations: usize,
    ) -> Self {
        let ssrc = rng.r#gen::<u32>();
        let sequence = rng.r#gen::<u16>();
        Self::new(ssrc, sequence, payload_types, generations)
    }

    /// Builds a RED payload for `data` sent at `timestamp`.
    ///
    /// Redundant headers come first, oldest generation first. Slots that
    /// have no history yet are filled with empty headers so header position
    /// j always refers to sequence number `seq - (N - j)`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Redundancy`] if `data` does not fit the
    /// 10-bit block length. Nothing is consumed in that case.
    pub fn encode(&mut self, data: &[u8], timestamp: u32) -> Result<RtpTextBuffer> {
        check_block_len(data)?;
        let pt = self.payload_types.t140;

        let history_len: usize = self.history.iter().map(|(_, d)| d.len()).sum();
        let mut payload = Vec::with_capacity(self.generations * 4 + 1 + history_len + data.len());
        for _ in self.history.len()..self.generations {
            payload.extend_from_slice(&RedBlockHeader::empty(pt).to_bytes());
        }

        let mut blocks: Vec<&[u8]> = Vec::with_capacity(self.history.len());
        for (generation_ts, generation) in &self.history {
            let offset = timestamp.wrapping_sub(*generation_ts);
            let header = if offset > MAX_TIMESTAMP_OFFSET {
                RedBlockHeader::empty(pt)
            } else {
                blocks.push(generation);
                RedBlockHeader {
                    payload_type: pt,
                    timestamp_offset: offset as u16,
                    block_length: generation.len() as u16,
                }
            };
            payload.extend_from_slice(&header.to_bytes());
        }

        payload.push(pt & 0x7F);
        for block in blocks {
            payload.extend_from_slice(block);
        }
        payload.extend_from_slice(data);

        if self.generations > 0 {
            self.history.push_back((timestamp, data.to_vec()));
            while self.history.len() > self.generations {
                self.history.pop_front();
            }
        }

        Ok(self.next_buffer(payload, timestamp, self.payload_types.red))
    }

    /// Plain `text/t140` payload for sessions that negotiated no RED.
    pub fn encode_plain(&mut self, data: &[u8], timestamp: u32) -> Result<RtpTextBuffer> {
        check_block_len(data)?;
        Ok(self.next_buffer(data.to_vec(), timestamp, self.payload_types.t140))
    }

    fn next_buffer(&mut self, data: Vec<u8>, timestamp: u32, payload_type: u8) -> RtpTextBuffer {
        let sequence_number = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        RtpTextBuffer {
            data,
            timestamp,
            sequence_number,
            ssrc: self.ssrc,
            marker: false,
            payload_type,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn payload_types(&self) -> PayloadTypes {
        self.payload_types
    }

    /// True while some history has not yet been carried N times, i.e. an
    /// empty follow-up packet would still protect earlier text.
    pub fn has_unprotected_text(&self) -> bool {
        self.history.iter().any(|(_, data)| !data.is_empty())
    }
}

fn check_block_len(data: &[u8]) -> Result<()> {
    if data.len() > MAX_BLOCK_LENGTH {
        return Err(NetworkError::Redundancy(format!(
            "text block of {} bytes exceeds {} byte limit",
            data.len(),
            MAX_BLOCK_LENGTH
        )));
    }
    Ok(())
}

/// Splits `data` into chunks of at most `max` bytes without cutting a UTF-8
/// sequence. A chunk only exceeds `max` when `max` is smaller than a single
/// character.
pub fn split_utf8(data: &[u8], max: usize) -> Vec<&[u8]> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut rest = data;

    while rest.len() > max {
        let mut cut = max;
        while cut > 0 && is_continuation(rest[cut]) {
            cut -= 1;
        }
        if cut == 0 {
            cut = max;
            while cut < rest.len() && is_continuation(rest[cut]) {
                cut += 1;
            }
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}
