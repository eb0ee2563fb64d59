//! RTP receive thread
//!
//! Validates incoming RTP, feeds the depacketizer and passes whatever it
//! releases through the T.140 redundancy filter before queueing it for the
//! application. The filter strips legacy redundancy headers once the
//! depacketizer has put the packets back in order. Loss deadlines are polled
//! on every pass, including idle ones.

use super::events::SessionEvent;
use super::rtcp_session::RtcpSession;
use crate::buffer::FifoBuffer;
use crate::worker::StopSignal;
use logging::Logger;
use network::{
    LOSS_CHAR, NetworkError, PayloadTypes, RtpPacket, RtpTextBuffer, RtpTextDepacketizer,
    T140RedundancyFilter, UdpTransport,
};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct RtpReceiverParams {
    /// Must have a read timeout so deadlines and the stop signal are polled
    pub transport: UdpTransport,
    pub depacketizer: Arc<Mutex<RtpTextDepacketizer>>,
    /// Applied to depacketized text; passes unframed text through
    pub filter: T140RedundancyFilter,
    pub payload_types: PayloadTypes,
    pub output: Arc<FifoBuffer<Vec<u8>>>,
    pub session: Arc<Mutex<RtcpSession>>,
    pub events: Sender<SessionEvent>,
    pub logger: Logger,
}

struct RtpReceiverState {
    packets_received: u64,
    invalid_packets: u64,
}

pub(crate) fn run_rtp_receiver(mut params: RtpReceiverParams, stop: StopSignal) {
    params.logger.info(&format!(
        "RTP receiver thread started (T.140 PT {}, RED PT {})",
        params.payload_types.t140, params.payload_types.red
    ));
    let mut state = RtpReceiverState {
        packets_received: 0,
        invalid_packets: 0,
    };

    while !stop.is_stopped() {
        match params.transport.receive() {
            Ok(Some((data, from))) => handle_datagram(&mut params, &mut state, &data, from),
            Ok(None) => {}
            Err(e) => {
                params.logger.error(&format!("RTP receive error: {}", e));
                thread::sleep(Duration::from_millis(10));
            }
        }

        let expired = lock_depacketizer(&params).expire_missing(Instant::now());
        deliver(&mut params, expired);
    }

    params.logger.info(&format!(
        "RTP receiver thread finished: {} packets, {} invalid",
        state.packets_received, state.invalid_packets
    ));
}

fn handle_datagram(
    params: &mut RtpReceiverParams,
    state: &mut RtpReceiverState,
    data: &[u8],
    from: std::net::SocketAddr,
) {
    let packet = match validate(data, params.payload_types) {
        Ok(packet) => packet,
        Err(e) => {
            state.invalid_packets += 1;
            params
                .logger
                .warn(&format!("Dropping RTP from {}: {}", from, e));
            return;
        }
    };
    state.packets_received += 1;

    let now = Instant::now();
    let events = params
        .session
        .lock()
        .unwrap_or_else(|poisoned| {
            params
                .logger
                .error("RTCP session mutex poisoned in RTP receiver, recovering");
            poisoned.into_inner()
        })
        .on_rtp_received(
            packet.header.ssrc,
            packet.header.sequence_number,
            packet.header.timestamp,
            packet.payload.len(),
            now,
        );
    for event in events {
        let _ = params.events.send(event);
    }

    params.logger.debug(&format!(
        "RTP seq={} ts={} pt={} ({} bytes) from {}",
        packet.header.sequence_number,
        packet.header.timestamp,
        packet.header.payload_type,
        packet.payload.len(),
        from
    ));

    let buffer = RtpTextBuffer::from(packet);
    let text = lock_depacketizer(params).decode(&buffer, now);
    deliver(params, text);
}

/// Parses the RTP header and checks the payload type belongs to this session.
pub(crate) fn validate(data: &[u8], payload_types: PayloadTypes) -> network::Result<RtpPacket> {
    let packet = RtpPacket::from_bytes(data)?;
    let pt = packet.header.payload_type;
    if pt != payload_types.t140 && pt != payload_types.red {
        return Err(NetworkError::Rtp(format!(
            "unexpected payload type {}",
            pt
        )));
    }
    Ok(packet)
}

fn deliver(params: &mut RtpReceiverParams, text: Vec<u8>) {
    if text.is_empty() {
        return;
    }
    let text = params.filter.filter_input(&text);
    if text.is_empty() {
        return;
    }

    let markers = count_loss_markers(&text);
    if markers > 0 {
        params
            .logger
            .warn(&format!("Text loss: {} marker(s) inserted", markers));
        let _ = params.events.send(SessionEvent::TextLoss { markers });
    }

    match params.output.try_put(text) {
        Ok(Ok(())) => {}
        Ok(Err(dropped)) => params.logger.error(&format!(
            "Output buffer full, dropping {} bytes of text",
            dropped.len()
        )),
        Err(_) => params.logger.debug("Output buffer closed"),
    }
}

fn count_loss_markers(text: &[u8]) -> usize {
    text.windows(LOSS_CHAR.len())
        .filter(|window| *window == LOSS_CHAR)
        .count()
}

fn lock_depacketizer(params: &RtpReceiverParams) -> MutexGuard<'_, RtpTextDepacketizer> {
    params.depacketizer.lock().unwrap_or_else(|poisoned| {
        params
            .logger
            .error("Depacketizer mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LocalSdes, RtcpParams, TextClock};
    use network::{RtpHeader, RtpTextPacketizer};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::mpsc;

    fn packet(pt: u8) -> Vec<u8> {
        let mut header = RtpHeader::new(pt, 1234);
        header.sequence_number = 5;
        RtpPacket::new(header, b"x".to_vec()).to_bytes()
    }

    #[test]
    fn test_validate_accepts_session_payload_types() {
        let pts = PayloadTypes::default();
        assert!(validate(&packet(98), pts).is_ok());
        assert!(validate(&packet(100), pts).is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_payload_type() {
        let pts = PayloadTypes::default();
        assert!(matches!(
            validate(&packet(0), pts),
            Err(NetworkError::Rtp(_))
        ));
        assert!(validate(&[0x80, 98, 0], pts).is_err());
    }

    #[test]
    fn test_count_loss_markers() {
        let mut text = b"ab".to_vec();
        text.extend_from_slice(LOSS_CHAR);
        text.extend_from_slice(b"c");
        text.extend_from_slice(LOSS_CHAR);
        assert_eq!(count_loss_markers(&text), 2);
        assert_eq!(count_loss_markers("é€".as_bytes()), 0);
    }

    fn receiver_params(levels: usize) -> (RtpReceiverParams, mpsc::Receiver<SessionEvent>) {
        let now = Instant::now();
        let pts = PayloadTypes::default();
        let transport =
            UdpTransport::new("127.0.0.1:0".parse().unwrap(), Logger::discard()).unwrap();
        let session = RtcpSession::new(
            1,
            LocalSdes::new("bob@example.org"),
            RtcpParams::default(),
            TextClock::new(now, 0),
            StdRng::seed_from_u64(3),
            Logger::discard(),
            now,
        );
        let (events, events_rx) = mpsc::channel();
        let params = RtpReceiverParams {
            transport,
            depacketizer: Arc::new(Mutex::new(RtpTextDepacketizer::new(
                pts,
                false,
                Logger::discard(),
            ))),
            filter: T140RedundancyFilter::new(levels, false, Logger::discard()).unwrap(),
            payload_types: pts,
            output: Arc::new(FifoBuffer::new(16)),
            session: Arc::new(Mutex::new(session)),
            events,
            logger: Logger::discard(),
        };
        (params, events_rx)
    }

    fn drain(output: &FifoBuffer<Vec<u8>>) -> Vec<u8> {
        let mut text = Vec::new();
        while let Some(chunk) = output.try_get() {
            text.extend(chunk);
        }
        text
    }

    #[test]
    fn test_reordered_legacy_frames_are_depacketized_before_filtering() {
        let (mut params, _events) = receiver_params(2);
        let mut state = RtpReceiverState {
            packets_received: 0,
            invalid_packets: 0,
        };
        let mut tx = T140RedundancyFilter::new(2, false, Logger::discard()).unwrap();
        let mut packetizer = RtpTextPacketizer::new(0xBEEF, 40, params.payload_types, 0);
        let datagrams: Vec<Vec<u8>> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let framed = tx.add_redundancy(text.as_bytes()).unwrap();
                packetizer
                    .encode_plain(&framed, i as u32 * 300)
                    .unwrap()
                    .into_packet()
                    .to_bytes()
            })
            .collect();
        let from = "127.0.0.1:5004".parse().unwrap();

        for index in [0, 2, 1] {
            handle_datagram(&mut params, &mut state, &datagrams[index], from);
        }

        assert_eq!(drain(&params.output), b"abc");
        assert_eq!(state.packets_received, 3);
        assert_eq!(params.filter.stats().recovered_blocks, 0);
        assert_eq!(params.filter.stats().loss_markers, 0);
    }

    #[test]
    fn test_unframed_text_passes_the_filter() {
        let (mut params, _events) = receiver_params(0);
        let mut state = RtpReceiverState {
            packets_received: 0,
            invalid_packets: 0,
        };
        let mut packetizer = RtpTextPacketizer::new(0xBEEF, 0, params.payload_types, 2);
        let bytes = packetizer.encode(b"red", 0).unwrap().into_packet().to_bytes();

        handle_datagram(&mut params, &mut state, &bytes, "127.0.0.1:5004".parse().unwrap());

        assert_eq!(drain(&params.output), b"red");
    }
}
