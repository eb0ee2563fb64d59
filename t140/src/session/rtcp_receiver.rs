//! RTCP receiver thread

use super::events::SessionEvent;
use super::rtcp_session::RtcpSession;
use crate::worker::StopSignal;
use logging::Logger;
use network::UdpTransport;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct RtcpReceiverParams {
    pub session: Arc<Mutex<RtcpSession>>,
    /// Must have a read timeout so the stop signal is polled
    pub transport: UdpTransport,
    pub events: Sender<SessionEvent>,
    pub logger: Logger,
}

pub(crate) fn run_rtcp_receiver(mut params: RtcpReceiverParams, stop: StopSignal) {
    params.logger.info("RTCP receiver thread started");
    let mut compounds = 0u64;

    while !stop.is_stopped() {
        let events = match params.transport.receive() {
            Ok(Some((data, from))) => {
                let mut session = lock_session(&params);
                match session.process_compound(&data, Instant::now()) {
                    Ok(events) => {
                        compounds += 1;
                        params.logger.debug(&format!(
                            "RTCP compound #{} from {} ({} bytes, {} events)",
                            compounds,
                            from,
                            data.len(),
                            events.len()
                        ));
                        events
                    }
                    Err(e) => {
                        params
                            .logger
                            .warn(&format!("Dropping RTCP from {}: {}", from, e));
                        Vec::new()
                    }
                }
            }
            // Quiet socket: still age out silent members.
            Ok(None) => lock_session(&params).update_sources(Instant::now()),
            Err(e) => {
                params.logger.error(&format!("RTCP receive error: {}", e));
                thread::sleep(Duration::from_millis(10));
                Vec::new()
            }
        };

        for event in events {
            if params.events.send(event).is_err() {
                params.logger.debug("Event receiver dropped, event discarded");
            }
        }
    }

    params.logger.info(&format!(
        "RTCP receiver thread finished after {} compounds",
        compounds
    ));
}

fn lock_session(params: &RtcpReceiverParams) -> std::sync::MutexGuard<'_, RtcpSession> {
    params.session.lock().unwrap_or_else(|poisoned| {
        params
            .logger
            .error("RTCP session mutex poisoned in receiver thread, recovering");
        poisoned.into_inner()
    })
}
