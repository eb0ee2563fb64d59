//! Real-time text session
//!
//! Owns the sockets, buffers and threads of one RFC 4103 session:
//!
//! ```text
//! send_text -> TextSyncBuffer -> rtp-send ------> UDP
//! read_text <- FifoBuffer <---- rtp-recv <------- UDP
//!              RtcpSession <--> rtcp-send/rtcp-recv <-> UDP
//! ```

use super::clock::TextClock;
use super::events::{SessionEvent, StopReason};
use super::rtcp_receiver::{self, RtcpReceiverParams};
use super::rtcp_sender::{self, RtcpSenderParams, SenderCommand};
use super::rtcp_session::{LocalSdes, RtcpParams, RtcpSession};
use super::rtp_receiver::{self, RtpReceiverParams};
use super::rtp_sender::{self, RtpSenderParams};
use crate::buffer::{FifoBuffer, TextSyncBuffer};
use crate::config::{RedundancyMode, SessionConfig};
use crate::worker::WorkerThread;
use logging::Logger;
use network::{
    DepacketizerStats, NetworkError, Result, RtpTextDepacketizer, RtpTextPacketizer,
    T140RedundancyFilter, UdpTransport,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Socket read timeout; bounds how late stop requests and loss deadlines
/// are noticed.
const RECV_POLL: Duration = Duration::from_millis(20);
/// Received text batches held for the application
const OUTPUT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Running,
    Stopped,
}

/// Pieces handed to the threads on [`TextSession::start`]
struct Pending {
    rtp_transport: UdpTransport,
    rtcp_transport: UdpTransport,
    packetizer: RtpTextPacketizer,
}

/// One two-party (or multicast) real-time text session.
pub struct TextSession {
    config: SessionConfig,
    logger: Logger,
    ssrc: u32,
    clock: TextClock,
    local_rtp_addr: SocketAddr,
    local_rtcp_addr: SocketAddr,

    rtcp_session: Arc<Mutex<RtcpSession>>,
    depacketizer: Arc<Mutex<RtpTextDepacketizer>>,
    sync_buffer: Arc<TextSyncBuffer>,
    output: Arc<FifoBuffer<Vec<u8>>>,

    events_tx: Sender<SessionEvent>,
    events_rx: Option<Receiver<SessionEvent>>,

    pending: Option<Pending>,
    rtp_sender: Option<WorkerThread>,
    rtp_receiver: Option<WorkerThread>,
    rtcp_receiver: Option<WorkerThread>,
    rtcp_sender: Option<JoinHandle<()>>,
    rtcp_commands: Option<Sender<SenderCommand>>,
    state: SessionState,
}

impl TextSession {
    /// Binds the RTP and RTCP sockets and prepares the session state.
    /// Nothing is sent until [`start`](TextSession::start).
    ///
    /// # Errors
    ///
    /// [`NetworkError::Config`] for an invalid configuration,
    /// [`NetworkError::Network`] when a socket cannot be bound.
    pub fn new(config: SessionConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        logger.info("Creating text session");

        let (rtp_transport, rtcp_transport) = create_transports(&config, &logger)?;
        let local_rtp_addr = rtp_transport.local_addr()?;
        let local_rtcp_addr = rtcp_transport.local_addr()?;

        let mut rng = StdRng::from_entropy();
        let payload_types = config.payload_types();
        let generations = match config.redundancy {
            RedundancyMode::Rfc4103 { generations } => generations,
            _ => 0,
        };
        let packetizer = RtpTextPacketizer::with_random_start(&mut rng, payload_types, generations);
        let ssrc = packetizer.ssrc();

        let now = Instant::now();
        let clock = TextClock::new(now, rng.r#gen());
        let rtcp_session = RtcpSession::new(
            ssrc,
            local_sdes(&config, ssrc, local_rtp_addr),
            RtcpParams {
                session_bandwidth: config.session_bandwidth,
                rtcp_fraction: config.rtcp_fraction,
                min_interval: config.rtcp_min_interval(),
            },
            clock,
            StdRng::seed_from_u64(rng.r#gen()),
            logger.for_component("RTCP"),
            now,
        );

        let depacketizer = RtpTextDepacketizer::new(
            payload_types,
            config.redundancy.uses_red(),
            logger.for_component("DEPACKETIZER"),
        );
        let sync_buffer = TextSyncBuffer::new(config.buffer_time(), logger.for_component("SYNC"))?;
        let (events_tx, events_rx) = channel();

        logger.info(&format!(
            "Session SSRC {:#010x}: RTP {} RTCP {} -> {}:{}/{}",
            ssrc,
            local_rtp_addr,
            local_rtcp_addr,
            config.remote_host,
            config.remote_rtp_port,
            config.remote_rtcp_port()
        ));

        Ok(Self {
            config,
            logger,
            ssrc,
            clock,
            local_rtp_addr,
            local_rtcp_addr,
            rtcp_session: Arc::new(Mutex::new(rtcp_session)),
            depacketizer: Arc::new(Mutex::new(depacketizer)),
            sync_buffer: Arc::new(sync_buffer),
            output: Arc::new(FifoBuffer::new(OUTPUT_CAPACITY)),
            events_tx,
            events_rx: Some(events_rx),
            pending: Some(Pending {
                rtp_transport,
                rtcp_transport,
                packetizer,
            }),
            rtp_sender: None,
            rtp_receiver: None,
            rtcp_receiver: None,
            rtcp_sender: None,
            rtcp_commands: None,
            state: SessionState::Created,
        })
    }

    /// Points the session at a different peer. Only before `start`.
    pub fn set_remote(&mut self, rtp: SocketAddr, rtcp: SocketAddr) -> Result<()> {
        let pending = self.pending.as_mut().ok_or_else(|| {
            NetworkError::Config("Remote can only be changed before start".to_string())
        })?;
        pending.rtp_transport.set_remote(rtp);
        pending.rtcp_transport.set_remote(rtcp);
        Ok(())
    }

    /// Spawns the RTP and RTCP threads.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(NetworkError::Config(
                "Session can only be started once".to_string(),
            ));
        }
        let Pending {
            rtp_transport,
            rtcp_transport,
            packetizer,
        } = self.pending.take().ok_or(NetworkError::Closed)?;

        self.logger.info("Starting RTP/RTCP threads");
        let rtp_send_transport = rtp_transport.try_clone()?;
        let rtcp_send_transport = rtcp_transport.try_clone()?;
        let levels = match self.config.redundancy {
            RedundancyMode::T140 { levels } => Some(levels),
            _ => None,
        };

        let send_params = RtpSenderParams {
            buffer: Arc::clone(&self.sync_buffer),
            packetizer,
            redundancy: self.config.redundancy,
            filter: levels
                .map(|l| {
                    T140RedundancyFilter::new(
                        l,
                        self.config.announce_rfc4103,
                        self.logger.for_component("T140-RED"),
                    )
                })
                .transpose()?,
            transport: rtp_send_transport,
            session: Arc::clone(&self.rtcp_session),
            clock: self.clock,
            buffer_time: self.config.buffer_time(),
            logger: self.logger.for_component("RTP-SEND"),
        };
        self.rtp_sender = Some(WorkerThread::spawn(
            "rtp-send",
            self.logger.clone(),
            move |stop| rtp_sender::run_rtp_sender(send_params, stop),
        )?);

        let recv_params = RtpReceiverParams {
            transport: rtp_transport,
            depacketizer: Arc::clone(&self.depacketizer),
            filter: T140RedundancyFilter::new(
                levels.unwrap_or(0),
                self.config.announce_rfc4103,
                self.logger.for_component("T140-RED"),
            )?,
            payload_types: self.config.payload_types(),
            output: Arc::clone(&self.output),
            session: Arc::clone(&self.rtcp_session),
            events: self.events_tx.clone(),
            logger: self.logger.for_component("RTP-RECV"),
        };
        self.rtp_receiver = Some(WorkerThread::spawn(
            "rtp-recv",
            self.logger.clone(),
            move |stop| rtp_receiver::run_rtp_receiver(recv_params, stop),
        )?);

        let rtcp_recv_params = RtcpReceiverParams {
            session: Arc::clone(&self.rtcp_session),
            transport: rtcp_transport,
            events: self.events_tx.clone(),
            logger: self.logger.for_component("RTCP-RECV"),
        };
        self.rtcp_receiver = Some(WorkerThread::spawn(
            "rtcp-recv",
            self.logger.clone(),
            move |stop| rtcp_receiver::run_rtcp_receiver(rtcp_recv_params, stop),
        )?);

        let (commands_tx, commands_rx) = channel();
        let rtcp_send_params = RtcpSenderParams {
            session: Arc::clone(&self.rtcp_session),
            transport: rtcp_send_transport,
            commands: commands_rx,
            logger: self.logger.for_component("RTCP-SEND"),
        };
        let handle = thread::Builder::new()
            .name("rtcp-send".to_string())
            .spawn(move || rtcp_sender::run_rtcp_sender(rtcp_send_params))
            .map_err(|e| {
                NetworkError::ThreadError(format!("Failed to spawn RTCP sender thread: {}", e))
            })?;
        self.rtcp_sender = Some(handle);
        self.rtcp_commands = Some(commands_tx);

        self.state = SessionState::Running;
        self.logger.info("Text session running");
        Ok(())
    }

    /// Queues text for the next buffer window.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Closed`] once the session has been stopped.
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send_bytes(text.as_bytes())
    }

    /// Queues raw T.140 bytes (UTF-8, possibly with T.140 control codes).
    pub fn send_bytes(&self, data: &[u8]) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Err(NetworkError::Closed);
        }
        self.sync_buffer.set_data(data)
    }

    /// Next chunk of received text, waiting at most `timeout`.
    /// Lost text shows up as U+FFFD.
    pub fn read_text(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.output.get_timeout(timeout)
    }

    /// Takes the event stream. Only the first call gets it.
    pub fn events(&mut self) -> Option<Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Members currently known, this session included
    pub fn members(&self) -> usize {
        self.lock_rtcp().members()
    }

    /// Known remote SSRCs
    pub fn remote_sources(&self) -> Vec<u32> {
        let session = self.lock_rtcp();
        let mut ssrcs: Vec<u32> = session
            .sources()
            .filter(|s| !s.is_local())
            .map(|s| s.ssrc())
            .collect();
        ssrcs.sort_unstable();
        ssrcs
    }

    pub fn receive_stats(&self) -> DepacketizerStats {
        self.depacketizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stats()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn local_rtp_addr(&self) -> SocketAddr {
        self.local_rtp_addr
    }

    pub fn local_rtcp_addr(&self) -> SocketAddr {
        self.local_rtcp_addr
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Stops the session.
    ///
    /// With [`StopReason::Goodbye`] buffered text and redundancy packets are
    /// sent first and the RTCP sender leaves with a BYE, which can take a few
    /// RTCP intervals' worth of backoff. [`StopReason::Immediate`] skips the
    /// trailing redundancy packets and the BYE.
    pub fn stop(&mut self, reason: StopReason) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        self.logger.info(&format!("Stopping text session ({:?})", reason));
        let was_running = self.state == SessionState::Running;
        self.state = SessionState::Stopped;
        self.pending = None;

        let mut result = Ok(());
        if let Some(mut sender) = self.rtp_sender.take() {
            // The sender drains the closed buffer and sends its last
            // redundancy packets unless told to stop.
            if reason == StopReason::Immediate {
                sender.request_stop();
            }
            self.sync_buffer.close();
            result = result.and(sender.join());
        } else {
            self.sync_buffer.close();
        }

        if was_running {
            let command = match reason {
                StopReason::Immediate => SenderCommand::Stop,
                StopReason::Goodbye(reason) => SenderCommand::SendBye(reason),
            };
            if let Some(commands) = self.rtcp_commands.take() {
                let _ = commands.send(command);
            }
            if let Some(handle) = self.rtcp_sender.take()
                && handle.join().is_err()
            {
                self.logger.error("RTCP sender thread panicked");
                result = result.and(Err(NetworkError::ThreadError(
                    "RTCP sender thread panicked".to_string(),
                )));
            }
        }

        for mut worker in [self.rtp_receiver.take(), self.rtcp_receiver.take()]
            .into_iter()
            .flatten()
        {
            result = result.and(worker.stop());
        }

        self.output.close();
        self.logger.info("Text session stopped");
        result
    }

    fn lock_rtcp(&self) -> MutexGuard<'_, RtcpSession> {
        self.rtcp_session.lock().unwrap_or_else(|poisoned| {
            self.logger.error("RTCP session mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Drop for TextSession {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            let _ = self.stop(StopReason::Immediate);
        }
    }
}

fn create_transports(
    config: &SessionConfig,
    logger: &Logger,
) -> Result<(UdpTransport, UdpTransport)> {
    let rtp_logger = logger.for_component("RTP-UDP");
    let rtcp_logger = logger.for_component("RTCP-UDP");

    let mut rtp = UdpTransport::new(config.local_rtp_addr()?, rtp_logger)?;
    let mut rtcp = UdpTransport::new(config.local_rtcp_addr()?, rtcp_logger)?;
    rtp.set_read_timeout(Some(RECV_POLL))?;
    rtcp.set_read_timeout(Some(RECV_POLL))?;

    if let Some(group) = config.multicast_group {
        rtp.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        rtcp.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
    }

    rtp.set_remote(config.remote_rtp_addr()?);
    rtcp.set_remote(config.remote_rtcp_addr()?);
    Ok((rtp, rtcp))
}

fn local_sdes(config: &SessionConfig, ssrc: u32, local: SocketAddr) -> LocalSdes {
    let cname = config
        .cname
        .clone()
        .unwrap_or_else(|| format!("{:08x}@{}", ssrc, local.ip()));
    LocalSdes {
        cname,
        name: config.name.clone(),
        email: config.email.clone(),
        tool: config.tool.clone(),
    }
}
