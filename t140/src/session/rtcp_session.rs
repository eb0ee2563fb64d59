//! RTCP session state
//!
//! Membership table, transmission interval (RFC 3550 Appendix A.7), BYE
//! backoff (Section 6.3.7), reverse reconsideration and timeouts, plus the
//! assembly of outgoing SR/RR + SDES (+ BYE) compound packets.
//!
//! The state is passive: the RTCP sender thread calls [`RtcpSession::on_wake`]
//! at [`RtcpSession::next_send_time`], the receiver thread feeds incoming
//! compounds to [`RtcpSession::process_compound`], and the RTP threads report
//! their traffic. Every call takes `now` explicitly.

use super::clock::TextClock;
use super::events::SessionEvent;
use super::source::Source;
use logging::Logger;
use network::codec::rtcp::{build_compound, parse_compound};
use network::{
    ByePacket, NtpTimestamp, ReceiverReport, ReportBlock, Result, RtcpPacket, SdesItem,
    SdesItemType, SenderReport, SourceDescription,
};
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Bytes of UDP and IPv4 header counted into the average RTCP size
pub const UDP_IP_OVERHEAD: usize = 28;

const SENDER_BW_FRACTION: f64 = 0.25;
const RECEIVER_BW_FRACTION: f64 = 1.0 - SENDER_BW_FRACTION;
/// Deterministic intervals of RTCP silence before a member is dropped
const TIMEOUT_INTERVALS: u32 = 5;
/// NAME, EMAIL and TOOL ride along on every n-th report
const SDES_FULL_EVERY: u64 = 7;
const MAX_REPORT_BLOCKS: usize = 31;
/// Report intervals are capped at one day
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// SDES items describing the local participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSdes {
    pub cname: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tool: Option<String>,
}

impl LocalSdes {
    pub fn new(cname: &str) -> Self {
        Self {
            cname: cname.to_string(),
            name: None,
            email: None,
            tool: None,
        }
    }

    fn items(&self, full: bool) -> Vec<SdesItem> {
        let mut items = vec![SdesItem::new(SdesItemType::Cname, &self.cname)];
        if full {
            let optional = [
                (SdesItemType::Name, &self.name),
                (SdesItemType::Email, &self.email),
                (SdesItemType::Tool, &self.tool),
            ];
            for (item_type, value) in optional {
                if let Some(value) = value {
                    items.push(SdesItem::new(item_type, value));
                }
            }
        }
        items
    }
}

/// Bandwidth and timing inputs to the interval computation
#[derive(Debug, Clone, PartialEq)]
pub struct RtcpParams {
    /// Octets per second
    pub session_bandwidth: f64,
    pub rtcp_fraction: f64,
    /// `Tmin`, halved before the first report
    pub min_interval: Duration,
}

impl Default for RtcpParams {
    fn default() -> Self {
        Self {
            session_bandwidth: 4000.0,
            rtcp_fraction: 0.05,
            min_interval: Duration::from_secs(5),
        }
    }
}

impl RtcpParams {
    fn rtcp_bandwidth(&self) -> f64 {
        self.session_bandwidth * self.rtcp_fraction
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// `Td`, used for timeouts
    pub deterministic: Duration,
    /// `T = Td * U(0.5, 1.5)`, used for scheduling
    pub randomized: Duration,
}

/// What the sender thread should do after [`RtcpSession::on_wake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeAction {
    /// Not yet time; sleep until the new `next_send_time`
    Reschedule,
    /// Send this compound and keep going
    Send(Vec<u8>),
    /// Send this compound (ending in BYE) and stop
    SendFinal(Vec<u8>),
    /// Stop without sending
    Terminate,
}

pub struct RtcpSession {
    ssrc: u32,
    sdes: LocalSdes,
    params: RtcpParams,
    clock: TextClock,
    sources: HashMap<u32, Source>,

    /// Last RTCP transmission
    tp: Instant,
    /// Next scheduled transmission check
    tn: Instant,
    td: Duration,
    t: Duration,
    pmembers: usize,
    members: usize,
    senders: usize,
    avg_rtcp_size: f64,
    initial: bool,
    we_sent: bool,

    leaving: bool,
    bye_reason: Option<String>,

    packets_sent: u32,
    octets_sent: u32,
    last_rtp_sent: Option<Instant>,
    last_rtcp_sent: Option<Instant>,
    reports_sent: u64,

    rng: StdRng,
    logger: Logger,
}

impl RtcpSession {
    /// A session with only the local member, first report scheduled.
    pub fn new(
        ssrc: u32,
        sdes: LocalSdes,
        params: RtcpParams,
        clock: TextClock,
        rng: StdRng,
        logger: Logger,
        now: Instant,
    ) -> Self {
        let mut sources = HashMap::new();
        sources.insert(ssrc, Source::local(ssrc, now));

        let mut session = Self {
            ssrc,
            sdes,
            params,
            clock,
            sources,
            tp: now,
            tn: now,
            td: Duration::ZERO,
            t: Duration::ZERO,
            pmembers: 1,
            members: 1,
            senders: 0,
            avg_rtcp_size: 0.0,
            initial: true,
            we_sent: false,
            leaving: false,
            bye_reason: None,
            packets_sent: 0,
            octets_sent: 0,
            last_rtp_sent: None,
            last_rtcp_sent: None,
            reports_sent: 0,
            rng,
            logger,
        };

        // Start from the size of the first packet we are going to send.
        session.avg_rtcp_size = (session.minimal_compound_size(false) + UDP_IP_OVERHEAD) as f64;
        let interval = session.calculate_interval();
        session.tn = now + interval.randomized;
        session.logger.info(&format!(
            "RTCP session for SSRC {:#010x}, first report in {:?}",
            ssrc, interval.randomized
        ));
        session
    }

    /// RFC 3550 A.7 `rtcp_interval()` without the e-3/2 compensation, so the
    /// randomized interval always lies within [0.5 Td, 1.5 Td].
    pub fn calculate_interval(&mut self) -> Interval {
        let mut bandwidth = self.params.rtcp_bandwidth();
        let mut n = self.members.max(1) as f64;

        if self.senders > 0 && (self.senders as f64) <= self.members as f64 * SENDER_BW_FRACTION {
            if self.we_sent {
                bandwidth *= SENDER_BW_FRACTION;
                n = self.senders as f64;
            } else {
                bandwidth *= RECEIVER_BW_FRACTION;
                n -= self.senders as f64;
            }
        }

        let min_time = if self.initial {
            self.params.min_interval / 2
        } else {
            self.params.min_interval
        };

        let mut deterministic = if bandwidth > 0.0 {
            Duration::try_from_secs_f64(self.avg_rtcp_size * n / bandwidth).unwrap_or(MAX_INTERVAL)
        } else {
            min_time
        };
        if deterministic < min_time {
            deterministic = min_time;
        }
        deterministic = deterministic.min(MAX_INTERVAL);

        let randomized = deterministic.mul_f64(self.rng.gen_range(0.5..1.5));
        self.td = deterministic;
        self.t = randomized;
        Interval {
            deterministic,
            randomized,
        }
    }

    /// Timer expiry (A.7 `OnExpire`). Always reschedules `tn` and syncs
    /// `pmembers`, whatever it decides.
    pub fn on_wake(&mut self, now: Instant) -> WakeAction {
        let interval = self.calculate_interval();
        let due = self.tp + interval.randomized;

        let action = if due <= now {
            if self.leaving {
                if self.has_sent_anything() {
                    let compound = self.build_bye(now);
                    self.record_transmission(compound.len(), now);
                    self.logger.info(&format!(
                        "Sending BYE ({} bytes) after {} reports",
                        compound.len(),
                        self.reports_sent
                    ));
                    WakeAction::SendFinal(compound)
                } else {
                    self.logger
                        .info("Leaving without BYE: no RTP or RTCP was ever sent");
                    WakeAction::Terminate
                }
            } else {
                let compound = self.build_report(now);
                self.record_transmission(compound.len(), now);
                let next = self.calculate_interval();
                self.tn = now + next.randomized;
                self.logger.debug(&format!(
                    "Report #{} ({} bytes), members={} senders={}, next in {:?}",
                    self.reports_sent,
                    compound.len(),
                    self.members,
                    self.senders,
                    next.randomized
                ));
                WakeAction::Send(compound)
            }
        } else {
            self.tn = due;
            WakeAction::Reschedule
        };

        self.pmembers = self.members;
        action
    }

    /// Starts leaving the session (RFC 3550 6.3.7). The BYE goes out from a
    /// later [`on_wake`](RtcpSession::on_wake) once the backoff interval,
    /// computed as if we had just joined, has passed.
    pub fn request_bye(&mut self, reason: Option<String>, now: Instant) {
        if self.leaving {
            return;
        }
        self.leaving = true;
        self.bye_reason = reason;

        self.tp = now;
        self.members = 1;
        self.pmembers = 1;
        self.senders = 0;
        self.initial = true;
        self.we_sent = false;
        self.avg_rtcp_size = (self.minimal_compound_size(true) + UDP_IP_OVERHEAD) as f64;

        let interval = self.calculate_interval();
        self.tn = self.tp + interval.randomized;
        self.logger.info(&format!(
            "BYE requested, backing off {:?}",
            interval.randomized
        ));
    }

    /// Outgoing RTP accounting, used for the SR sender info and the
    /// sender share of the bandwidth.
    pub fn on_rtp_sent(&mut self, payload_len: usize, now: Instant) {
        self.packets_sent = self.packets_sent.wrapping_add(1);
        self.octets_sent = self.octets_sent.wrapping_add(payload_len as u32);
        self.last_rtp_sent = Some(now);

        if self.leaving {
            return;
        }
        self.we_sent = true;
        if let Some(local) = self.sources.get_mut(&self.ssrc) {
            local.set_sender(true);
        }
        self.refresh_counts();
    }

    /// Incoming RTP accounting. Returns `NewSource` for an unseen SSRC.
    pub fn on_rtp_received(
        &mut self,
        ssrc: u32,
        sequence_number: u16,
        rtp_timestamp: u32,
        payload_len: usize,
        now: Instant,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if ssrc == self.ssrc {
            self.logger.warn(&format!(
                "RTP with our own SSRC {:#010x}: collision or loop",
                ssrc
            ));
            return events;
        }

        let arrival = self.clock.timestamp(now);
        let source = self.source_entry(ssrc, now, &mut events);
        if !source.on_rtp(sequence_number, rtp_timestamp, arrival, payload_len, now) {
            self.logger.debug(&format!(
                "SSRC {:#010x}: sequence jump to {}, waiting for confirmation",
                ssrc, sequence_number
            ));
        }
        self.refresh_counts();
        events
    }

    /// Validates and applies one received compound packet.
    ///
    /// # Errors
    ///
    /// [`network::NetworkError::Rtcp`] when the datagram is not a valid
    /// compound; the session state is left untouched. Sub-packets with a
    /// malformed body are logged and skipped, the rest still apply.
    pub fn process_compound(&mut self, data: &[u8], now: Instant) -> Result<Vec<SessionEvent>> {
        let compound = parse_compound(data)?;
        for warning in &compound.warnings {
            self.logger.warn(&format!("Malformed RTCP, {}", warning));
        }
        self.update_avg_rtcp_size(data.len());

        let own = self.ssrc;
        let mut events = Vec::new();
        for packet in compound.packets {
            match packet {
                RtcpPacket::SenderReport(report) => {
                    if report.ssrc == own {
                        continue;
                    }
                    let source = self.source_entry(report.ssrc, now, &mut events);
                    source.on_sender_report(&report, now);
                    events.push(SessionEvent::SenderReport {
                        ssrc: report.ssrc,
                        packet_count: report.sender_packet_count,
                        octet_count: report.sender_octet_count,
                    });
                }
                RtcpPacket::ReceiverReport(report) => {
                    if report.ssrc == own {
                        continue;
                    }
                    self.source_entry(report.ssrc, now, &mut events).on_rtcp(now);
                    events.push(SessionEvent::ReceiverReport {
                        ssrc: report.ssrc,
                        block: about(&report.report_blocks, own),
                    });
                }
                RtcpPacket::SourceDescription(sdes) => {
                    for chunk in sdes.chunks {
                        if chunk.ssrc == own {
                            continue;
                        }
                        let source = self.source_entry(chunk.ssrc, now, &mut events);
                        source.on_rtcp(now);
                        for item in &chunk.items {
                            source.set_sdes(item);
                        }
                        events.extend(chunk.items.iter().map(|item| SessionEvent::Sdes {
                            ssrc: chunk.ssrc,
                            item_type: item.item_type,
                            value: item.text(),
                        }));
                    }
                }
                RtcpPacket::Bye(bye) => {
                    for ssrc in bye.ssrcs.iter().copied().filter(|&ssrc| ssrc != own) {
                        self.on_bye(ssrc, bye.reason.clone(), now, &mut events);
                    }
                }
            }
        }

        events.extend(self.update_sources(now));
        Ok(events)
    }

    fn on_bye(
        &mut self,
        ssrc: u32,
        reason: Option<String>,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) {
        if self.leaving {
            // Other leavers count towards our own BYE backoff.
            self.members += 1;
            return;
        }

        self.logger.info(&format!(
            "BYE from {:#010x}{}",
            ssrc,
            reason
                .as_deref()
                .map(|r| format!(": {}", r))
                .unwrap_or_default()
        ));
        events.push(SessionEvent::Bye { ssrc, reason });
        if self.sources.remove(&ssrc).is_some() {
            self.refresh_counts();
            self.reverse_reconsider(now);
        }
    }

    /// Membership aging: senders silent for `T` become receivers, members
    /// without RTCP for 5 Td are dropped. The local member is never dropped.
    pub fn update_sources(&mut self, now: Instant) -> Vec<SessionEvent> {
        let sender_cutoff = now.checked_sub(self.t);
        let member_cutoff = now.checked_sub(self.td * TIMEOUT_INTERVALS);

        if let Some(cutoff) = sender_cutoff {
            for source in self.sources.values_mut().filter(|s| !s.is_local()) {
                if source.is_sender() && source.last_rtp().is_none_or(|last| last < cutoff) {
                    source.set_sender(false);
                }
            }
            // Our own sender status lapses after two silent intervals.
            let local_cutoff = now.checked_sub(self.t * 2);
            if self.we_sent
                && local_cutoff.is_some_and(|c| self.last_rtp_sent.is_none_or(|last| last < c))
            {
                self.we_sent = false;
                if let Some(local) = self.sources.get_mut(&self.ssrc) {
                    local.set_sender(false);
                }
            }
        }

        let timed_out: Vec<u32> = match member_cutoff {
            Some(cutoff) => self
                .sources
                .values()
                .filter(|s| !s.is_local() && s.last_rtcp() < cutoff)
                .map(Source::ssrc)
                .collect(),
            None => Vec::new(),
        };

        let mut events = Vec::with_capacity(timed_out.len());
        for ssrc in timed_out {
            self.sources.remove(&ssrc);
            self.logger
                .info(&format!("Source {:#010x} timed out", ssrc));
            events.push(SessionEvent::SourceTimedOut { ssrc });
        }

        self.refresh_counts();
        if !events.is_empty() {
            self.reverse_reconsider(now);
        }
        events
    }

    /// Pulls `tn` and `tp` towards `now` when membership shrinks
    /// (RFC 3550 6.3.4).
    fn reverse_reconsider(&mut self, now: Instant) {
        if self.members >= self.pmembers {
            return;
        }
        let ratio = self.members as f64 / self.pmembers as f64;
        self.tn = now + self.tn.saturating_duration_since(now).mul_f64(ratio);
        self.tp = now
            .checked_sub(now.saturating_duration_since(self.tp).mul_f64(ratio))
            .unwrap_or(self.tp);
        self.pmembers = self.members;
    }

    fn source_entry(
        &mut self,
        ssrc: u32,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) -> &mut Source {
        self.sources.entry(ssrc).or_insert_with(|| {
            events.push(SessionEvent::NewSource { ssrc });
            Source::new(ssrc, now)
        })
    }

    /// Keeps `members`/`senders` in line with the table, except while
    /// leaving, where they are counted by hand.
    fn refresh_counts(&mut self) {
        if self.leaving {
            return;
        }
        self.members = self.sources.len();
        self.senders = self.sources.values().filter(|s| s.is_sender()).count();
    }

    fn update_avg_rtcp_size(&mut self, packet_size: usize) {
        let size = (packet_size + UDP_IP_OVERHEAD) as f64;
        self.avg_rtcp_size += (size - self.avg_rtcp_size) / 16.0;
    }

    fn record_transmission(&mut self, size: usize, now: Instant) {
        self.update_avg_rtcp_size(size);
        self.tp = now;
        self.last_rtcp_sent = Some(now);
        self.initial = false;
    }

    fn has_sent_anything(&self) -> bool {
        self.packets_sent > 0 || self.reports_sent > 0
    }

    /// RTP went out since the previous report
    fn sends_sender_report(&self) -> bool {
        self.last_rtp_sent
            .is_some_and(|rtp| self.last_rtcp_sent.is_none_or(|rtcp| rtp > rtcp))
    }

    fn report_packets(&mut self, now: Instant) -> Vec<RtcpPacket> {
        self.reports_sent += 1;

        let blocks: Vec<ReportBlock> = self
            .sources
            .values_mut()
            .filter(|s| !s.is_local())
            .filter_map(|s| s.report_block(now))
            .take(MAX_REPORT_BLOCKS)
            .collect();

        let report = if self.sends_sender_report() {
            RtcpPacket::SenderReport(SenderReport {
                ssrc: self.ssrc,
                ntp: NtpTimestamp::now(),
                rtp_timestamp: self.clock.timestamp(now),
                sender_packet_count: self.packets_sent,
                sender_octet_count: self.octets_sent,
                report_blocks: blocks,
            })
        } else {
            RtcpPacket::ReceiverReport(ReceiverReport {
                ssrc: self.ssrc,
                report_blocks: blocks,
            })
        };

        let full = self.reports_sent % SDES_FULL_EVERY == 0;
        let sdes = SourceDescription::for_source(self.ssrc, self.sdes.items(full));
        vec![report, RtcpPacket::SourceDescription(sdes)]
    }

    /// SR or RR followed by SDES
    pub fn build_report(&mut self, now: Instant) -> Vec<u8> {
        build_compound(&self.report_packets(now))
    }

    /// Report and SDES followed by BYE
    pub fn build_bye(&mut self, now: Instant) -> Vec<u8> {
        let mut packets = self.report_packets(now);
        packets.push(RtcpPacket::Bye(ByePacket::new(
            self.ssrc,
            self.bye_reason.clone(),
        )));
        build_compound(&packets)
    }

    /// Size of an empty RR + CNAME (+ BYE) compound
    fn minimal_compound_size(&self, with_bye: bool) -> usize {
        let mut packets = vec![
            RtcpPacket::ReceiverReport(ReceiverReport::new(self.ssrc)),
            RtcpPacket::SourceDescription(SourceDescription::for_source(
                self.ssrc,
                self.sdes.items(false),
            )),
        ];
        if with_bye {
            packets.push(RtcpPacket::Bye(ByePacket::new(
                self.ssrc,
                self.bye_reason.clone(),
            )));
        }
        build_compound(&packets).len()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn next_send_time(&self) -> Instant {
        self.tn
    }

    pub fn last_send_time(&self) -> Instant {
        self.tp
    }

    pub fn members(&self) -> usize {
        self.members
    }

    pub fn pmembers(&self) -> usize {
        self.pmembers
    }

    pub fn senders(&self) -> usize {
        self.senders
    }

    pub fn avg_rtcp_size(&self) -> f64 {
        self.avg_rtcp_size
    }

    pub fn deterministic_interval(&self) -> Duration {
        self.td
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn we_sent(&self) -> bool {
        self.we_sent
    }

    pub fn is_leaving(&self) -> bool {
        self.leaving
    }

    pub fn reports_sent(&self) -> u64 {
        self.reports_sent
    }

    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }

    pub fn source(&self, ssrc: u32) -> Option<&Source> {
        self.sources.get(&ssrc)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }
}

fn about(blocks: &[ReportBlock], ssrc: u32) -> Option<ReportBlock> {
    blocks.iter().find(|b| b.ssrc == ssrc).cloned()
}
