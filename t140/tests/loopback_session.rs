//! Two sessions talking over 127.0.0.1

use logging::Logger;
use network::{SdesItemType, T140RedundancyFilter};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use t140::{NetworkError, RedundancyMode, SessionConfig, SessionEvent, StopReason, TextSession};

const WAIT: Duration = Duration::from_secs(5);

fn loopback_config(redundancy: RedundancyMode) -> SessionConfig {
    let mut config = SessionConfig::default()
        .with_local_port(0)
        .with_redundancy(redundancy)
        .with_buffer_time(Duration::from_millis(30))
        .with_rtcp_bandwidth(100_000.0, 0.05)
        .with_rtcp_min_interval(Duration::from_millis(100));
    config.bind_address = "127.0.0.1".to_string();
    config
}

/// Two sessions pointed at each other, not yet started.
fn session_pair(redundancy: RedundancyMode) -> (TextSession, TextSession) {
    let mut a = TextSession::new(
        loopback_config(redundancy).with_name("Alice"),
        Logger::discard(),
    )
    .unwrap();
    let mut b = TextSession::new(loopback_config(redundancy), Logger::discard()).unwrap();

    a.set_remote(b.local_rtp_addr(), b.local_rtcp_addr()).unwrap();
    b.set_remote(a.local_rtp_addr(), a.local_rtcp_addr()).unwrap();
    (a, b)
}

fn read_until(session: &TextSession, expected: &[u8]) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    let mut received = Vec::new();
    while received.len() < expected.len() && Instant::now() < deadline {
        if let Some(text) = session.read_text(Duration::from_millis(50)).unwrap() {
            received.extend(text);
        }
    }
    received
}

fn wait_for_event<F>(events: &Receiver<SessionEvent>, mut predicate: F) -> Option<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return Some(event),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

#[test]
fn test_text_crosses_with_red_redundancy() {
    let (mut a, mut b) = session_pair(RedundancyMode::Rfc4103 { generations: 2 });
    a.start().unwrap();
    b.start().unwrap();

    a.send_text("hello ").unwrap();
    a.send_text("world").unwrap();
    assert_eq!(read_until(&b, b"hello world"), b"hello world");

    b.send_text("hi").unwrap();
    assert_eq!(read_until(&a, b"hi"), b"hi");

    assert_eq!(b.receive_stats().loss_markers, 0);
    a.stop(StopReason::Immediate).unwrap();
    b.stop(StopReason::Immediate).unwrap();
}

#[test]
fn test_text_crosses_with_legacy_redundancy() {
    let (mut a, mut b) = session_pair(RedundancyMode::T140 { levels: 2 });
    a.start().unwrap();
    b.start().unwrap();

    a.send_text("caf\u{e9}").unwrap();
    assert_eq!(read_until(&b, "caf\u{e9}".as_bytes()), "caf\u{e9}".as_bytes());
}

#[test]
fn test_legacy_peers_announcing_rfc4103() {
    let mut a = TextSession::new(
        loopback_config(RedundancyMode::T140 { levels: 1 }).with_announce_rfc4103(true),
        Logger::discard(),
    )
    .unwrap();
    let mut b = TextSession::new(
        loopback_config(RedundancyMode::T140 { levels: 1 }),
        Logger::discard(),
    )
    .unwrap();
    a.set_remote(b.local_rtp_addr(), b.local_rtcp_addr()).unwrap();
    b.set_remote(a.local_rtp_addr(), a.local_rtcp_addr()).unwrap();
    a.start().unwrap();
    b.start().unwrap();

    a.send_text("ok").unwrap();
    assert_eq!(read_until(&b, b"ok"), b"ok");
}

#[test]
fn test_red_session_strips_legacy_headers() {
    let (mut a, mut b) = session_pair(RedundancyMode::Rfc4103 { generations: 2 });
    a.start().unwrap();
    b.start().unwrap();

    // a peer running the legacy filter on top of RED
    let mut legacy = T140RedundancyFilter::new(1, true, Logger::discard()).unwrap();
    a.send_bytes(&legacy.add_redundancy(b"framed").unwrap())
        .unwrap();
    assert_eq!(read_until(&b, b"framed"), b"framed");
}

#[test]
fn test_peer_learns_sdes_and_goodbye() {
    let (mut a, mut b) = session_pair(RedundancyMode::default());
    let events = b.events().unwrap();
    assert!(b.events().is_none());
    a.start().unwrap();
    b.start().unwrap();

    let ssrc = a.ssrc();
    let name = wait_for_event(&events, |e| {
        matches!(e, SessionEvent::Sdes { item_type: SdesItemType::Name, .. })
    });
    assert_eq!(
        name,
        Some(SessionEvent::Sdes {
            ssrc,
            item_type: SdesItemType::Name,
            value: "Alice".to_string(),
        })
    );
    assert_eq!(b.remote_sources(), vec![ssrc]);
    assert_eq!(b.members(), 2);

    a.stop(StopReason::Goodbye(Some("done".to_string())))
        .unwrap();
    let bye = wait_for_event(&events, |e| matches!(e, SessionEvent::Bye { .. }));
    assert_eq!(
        bye,
        Some(SessionEvent::Bye {
            ssrc,
            reason: Some("done".to_string()),
        })
    );
    b.stop(StopReason::Immediate).unwrap();
}

#[test]
fn test_goodbye_flushes_buffered_text() {
    let (mut a, mut b) = session_pair(RedundancyMode::default());
    a.start().unwrap();
    b.start().unwrap();

    a.send_text("last words").unwrap();
    a.stop(StopReason::Goodbye(None)).unwrap();
    assert_eq!(read_until(&b, b"last words"), b"last words");
}

#[test]
fn test_lifecycle_errors() {
    let (mut a, _b) = session_pair(RedundancyMode::None);
    a.start().unwrap();
    assert!(matches!(a.start(), Err(NetworkError::Config(_))));
    assert!(a.is_running());

    a.stop(StopReason::Immediate).unwrap();
    assert!(!a.is_running());
    assert!(matches!(a.send_text("late"), Err(NetworkError::Closed)));
    assert!(a.stop(StopReason::Immediate).is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    let config = loopback_config(RedundancyMode::Rfc4103 { generations: 12 });
    assert!(matches!(
        TextSession::new(config, Logger::discard()),
        Err(NetworkError::Config(_))
    ));
}
