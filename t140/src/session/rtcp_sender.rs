//! RTCP sender thread

use super::rtcp_session::{RtcpSession, WakeAction};
use logging::Logger;
use network::UdpTransport;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep, so a `tn` moved earlier by reverse
/// reconsideration is picked up in time.
const MAX_SLEEP: Duration = Duration::from_millis(200);

/// Commands from the owning session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SenderCommand {
    /// Exit at once, no BYE
    Stop,
    /// Start the BYE procedure; the thread exits once it completes
    SendBye(Option<String>),
}

pub(crate) struct RtcpSenderParams {
    pub session: Arc<Mutex<RtcpSession>>,
    pub transport: UdpTransport,
    pub commands: Receiver<SenderCommand>,
    pub logger: Logger,
}

pub(crate) fn run_rtcp_sender(mut params: RtcpSenderParams) {
    params.logger.info("RTCP sender thread started");

    loop {
        let wait = {
            let session = lock_session(&params);
            session
                .next_send_time()
                .saturating_duration_since(Instant::now())
                .min(MAX_SLEEP)
        };

        match params.commands.recv_timeout(wait) {
            Ok(SenderCommand::Stop) | Err(RecvTimeoutError::Disconnected) => {
                params.logger.info("RTCP sender stopping without BYE");
                break;
            }
            Ok(SenderCommand::SendBye(reason)) => {
                lock_session(&params).request_bye(reason, Instant::now());
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let action = {
            let mut session = lock_session(&params);
            if now < session.next_send_time() {
                continue;
            }
            session.on_wake(now)
        };

        match action {
            WakeAction::Reschedule => {}
            WakeAction::Send(compound) => {
                send_packet(&mut params, &compound);
            }
            WakeAction::SendFinal(compound) => {
                send_packet(&mut params, &compound);
                break;
            }
            WakeAction::Terminate => break,
        }
    }

    params.logger.info("RTCP sender thread finished");
}

fn lock_session(params: &RtcpSenderParams) -> std::sync::MutexGuard<'_, RtcpSession> {
    params.session.lock().unwrap_or_else(|poisoned| {
        params
            .logger
            .error("RTCP session mutex poisoned in sender thread, recovering");
        poisoned.into_inner()
    })
}

/// Send failures are logged; the schedule carries on.
fn send_packet(params: &mut RtcpSenderParams, compound: &[u8]) -> bool {
    match params.transport.send(compound) {
        Ok(sent) => {
            params.logger.debug(&format!("Sent RTCP compound ({} bytes)", sent));
            true
        }
        Err(e) => {
            params
                .logger
                .error(&format!("Failed to send RTCP compound: {}", e));
            false
        }
    }
}
