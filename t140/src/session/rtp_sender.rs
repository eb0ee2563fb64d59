//! RTP send thread
//!
//! Drains the text sync buffer, frames each batch according to the
//! redundancy mode and sends it. With RFC 4103 redundancy, idle windows after
//! text are filled with empty packets until the last text has been carried
//! in every redundant generation.

use super::clock::TextClock;
use super::rtcp_session::RtcpSession;
use crate::buffer::TextSyncBuffer;
use crate::config::RedundancyMode;
use crate::worker::StopSignal;
use logging::Logger;
use network::codec::packetizers::t140::red::MAX_BLOCK_LENGTH;
use network::codec::t140_redundancy::MAX_BLOCK_LENGTH as T140_MAX_BLOCK_LENGTH;
use network::{
    NetworkError, Result, RtpTextBuffer, RtpTextPacketizer, T140RedundancyFilter, UdpTransport,
    split_utf8,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct RtpSenderParams {
    pub buffer: Arc<TextSyncBuffer>,
    pub packetizer: RtpTextPacketizer,
    pub redundancy: RedundancyMode,
    /// Present in [`RedundancyMode::T140`]
    pub filter: Option<T140RedundancyFilter>,
    pub transport: UdpTransport,
    pub session: Arc<Mutex<RtcpSession>>,
    pub clock: TextClock,
    pub buffer_time: Duration,
    pub logger: Logger,
}

struct RtpSenderState {
    /// Next packet starts a talkspurt (marker bit)
    idle: bool,
    /// Empty packets still owed to cover the last text with redundancy
    flush_remaining: usize,
    packets_sent: u64,
}

pub(crate) fn run_rtp_sender(mut params: RtpSenderParams, stop: StopSignal) {
    params.logger.info(&format!(
        "RTP sender thread started (SSRC {:#010x}, {:?})",
        params.packetizer.ssrc(),
        params.redundancy
    ));
    let mut state = RtpSenderState {
        idle: true,
        flush_remaining: 0,
        packets_sent: 0,
    };

    loop {
        match params.buffer.get_data_timeout(params.buffer_time) {
            Ok(Some(text)) => {
                if let Err(e) = send_text(&mut params, &mut state, &text) {
                    params.logger.error(&format!("Failed to send text: {}", e));
                }
                state.flush_remaining = params.packetizer.generations();
            }
            Ok(None) => {
                if stop.is_stopped() {
                    break;
                }
                flush_redundancy(&mut params, &mut state);
            }
            Err(NetworkError::Closed) => break,
            Err(e) => {
                params.logger.error(&format!("Sync buffer error: {}", e));
                break;
            }
        }
    }

    // A closed buffer ends the loop before the flush packets went out.
    // An immediate stop skips them.
    while !stop.is_stopped()
        && state.flush_remaining > 0
        && params.packetizer.has_unprotected_text()
    {
        thread::sleep(params.buffer_time);
        flush_redundancy(&mut params, &mut state);
    }

    params.logger.info(&format!(
        "RTP sender thread finished after {} packets",
        state.packets_sent
    ));
}

/// Splits `text` into blocks that fit the framing and sends one packet per block.
fn send_text(params: &mut RtpSenderParams, state: &mut RtpSenderState, text: &[u8]) -> Result<()> {
    let max_block = match params.redundancy {
        RedundancyMode::T140 { .. } => T140_MAX_BLOCK_LENGTH,
        _ => MAX_BLOCK_LENGTH,
    };

    for block in split_utf8(text, max_block) {
        let now = Instant::now();
        let timestamp = params.clock.timestamp(now);
        let mut buffer = match (&params.redundancy, params.filter.as_mut()) {
            (RedundancyMode::Rfc4103 { .. }, _) => params.packetizer.encode(block, timestamp)?,
            (RedundancyMode::T140 { .. }, Some(filter)) => {
                let framed = filter.add_redundancy(block)?;
                params.packetizer.encode_plain(&framed, timestamp)?
            }
            _ => params.packetizer.encode_plain(block, timestamp)?,
        };
        buffer.marker = state.idle;
        state.idle = false;
        transmit(params, state, buffer, now)?;
    }
    Ok(())
}

/// Sends one empty RED packet while earlier text still lacks full coverage.
fn flush_redundancy(params: &mut RtpSenderParams, state: &mut RtpSenderState) {
    if state.flush_remaining == 0 || !params.packetizer.has_unprotected_text() {
        state.flush_remaining = 0;
        state.idle = true;
        return;
    }
    state.flush_remaining -= 1;

    let now = Instant::now();
    let timestamp = params.clock.timestamp(now);
    let result = params
        .packetizer
        .encode(&[], timestamp)
        .and_then(|buffer| transmit(params, state, buffer, now));
    if let Err(e) = result {
        params
            .logger
            .error(&format!("Failed to send redundancy packet: {}", e));
    }
}

fn transmit(
    params: &mut RtpSenderParams,
    state: &mut RtpSenderState,
    buffer: RtpTextBuffer,
    now: Instant,
) -> Result<()> {
    let payload_len = buffer.data.len();
    let sequence_number = buffer.sequence_number;
    let bytes = buffer.into_packet().to_bytes();
    params.transport.send(&bytes)?;
    state.packets_sent += 1;

    params
        .session
        .lock()
        .unwrap_or_else(|poisoned| {
            params
                .logger
                .error("RTCP session mutex poisoned in RTP sender, recovering");
            poisoned.into_inner()
        })
        .on_rtp_sent(payload_len, now);

    params.logger.debug(&format!(
        "RTP seq={} sent ({} payload bytes)",
        sequence_number, payload_len
    ));
    Ok(())
}
