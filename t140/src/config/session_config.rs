//! Text session configuration
//!
//! Loaded from JSON through `config_loader`; every field has a default so a
//! file only needs to name what it changes.

use super::LoggingConfig;
use network::codec::t140_redundancy::MAX_LEVELS;
use network::{NetworkError, PayloadTypes, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Deepest RFC 4103 redundancy accepted. RFC 4103 recommends 2 and warns
/// against going much deeper.
pub const MAX_GENERATIONS: usize = 9;

/// How outgoing text is protected against packet loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RedundancyMode {
    /// Plain `text/t140`, losses show up as a marker
    None,
    /// RFC 4103 RED framing carrying `generations` earlier payloads
    Rfc4103 { generations: usize },
    /// Legacy T.140-level framing inside plain `text/t140` payloads
    T140 { levels: usize },
}

impl Default for RedundancyMode {
    fn default() -> Self {
        RedundancyMode::Rfc4103 { generations: 2 }
    }
}

impl RedundancyMode {
    pub fn uses_red(&self) -> bool {
        matches!(self, RedundancyMode::Rfc4103 { .. })
    }
}

/// Configuration for one text session
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local bind address (without port)
    pub bind_address: String,
    pub local_rtp_port: u16,
    /// Defaults to `local_rtp_port + 1`
    pub local_rtcp_port: Option<u16>,
    pub remote_host: String,
    pub remote_rtp_port: u16,
    /// Defaults to `remote_rtp_port + 1`
    pub remote_rtcp_port: Option<u16>,
    /// IPv4 group joined by both receive sockets
    pub multicast_group: Option<Ipv4Addr>,

    pub t140_payload_type: u8,
    pub red_payload_type: u8,
    pub redundancy: RedundancyMode,
    /// Sets the RFC 4103 support flag in outgoing T.140 redundancy headers,
    /// telling a legacy peer to leave loss recovery to RED
    pub announce_rfc4103: bool,
    /// Keystroke batching window
    pub buffer_time_ms: u64,

    /// Session bandwidth in octets per second
    pub session_bandwidth: f64,
    /// Share of the session bandwidth given to RTCP
    pub rtcp_fraction: f64,
    pub rtcp_min_interval_ms: u64,

    /// Canonical name. Derived from the SSRC and local address when unset.
    pub cname: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tool: Option<String>,

    pub logging: LoggingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            local_rtp_port: 5004,
            local_rtcp_port: None,
            remote_host: "127.0.0.1".to_string(),
            remote_rtp_port: 5004,
            remote_rtcp_port: None,
            multicast_group: None,
            t140_payload_type: 98,
            red_payload_type: 100,
            redundancy: RedundancyMode::default(),
            announce_rfc4103: false,
            buffer_time_ms: 300,
            session_bandwidth: 4000.0,
            rtcp_fraction: 0.05,
            rtcp_min_interval_ms: 5000,
            cname: None,
            name: None,
            email: None,
            tool: Some(format!("t140-rs {}", env!("CARGO_PKG_VERSION"))),
            logging: LoggingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: SessionConfig = config_loader::load_json(path)
            .map_err(|e| NetworkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Searches the usual locations for `filename` and loads it.
    pub fn find_and_load(filename: &str) -> Result<Self> {
        let path = config_loader::find_config_file(filename)
            .map_err(|e| NetworkError::Config(e.to_string()))?;
        Self::load_from_file(path)
    }

    /// Rejects settings that cannot be put on the wire.
    pub fn validate(&self) -> Result<()> {
        for (label, pt) in [
            ("T.140", self.t140_payload_type),
            ("RED", self.red_payload_type),
        ] {
            if pt > 127 {
                return Err(NetworkError::Config(format!(
                    "{} payload type {} does not fit in 7 bits",
                    label, pt
                )));
            }
        }
        if self.t140_payload_type == self.red_payload_type {
            return Err(NetworkError::Config(format!(
                "T.140 and RED payload types must differ (both {})",
                self.t140_payload_type
            )));
        }

        match self.redundancy {
            RedundancyMode::Rfc4103 { generations } if generations > MAX_GENERATIONS => {
                return Err(NetworkError::Config(format!(
                    "{} redundant generations exceeds {}",
                    generations, MAX_GENERATIONS
                )));
            }
            RedundancyMode::T140 { levels } if levels > MAX_LEVELS => {
                return Err(NetworkError::Config(format!(
                    "T.140 redundancy level {} exceeds {}",
                    levels, MAX_LEVELS
                )));
            }
            _ => {}
        }

        if self.buffer_time_ms == 0 {
            return Err(NetworkError::Config(
                "buffer_time_ms must be positive".to_string(),
            ));
        }
        if !(self.session_bandwidth > 0.0) {
            return Err(NetworkError::Config(
                "session_bandwidth must be positive".to_string(),
            ));
        }
        if !(self.rtcp_fraction > 0.0 && self.rtcp_fraction <= 1.0) {
            return Err(NetworkError::Config(format!(
                "rtcp_fraction {} outside (0, 1]",
                self.rtcp_fraction
            )));
        }
        if self.rtcp_min_interval_ms == 0 {
            return Err(NetworkError::Config(
                "rtcp_min_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payload_types(&self) -> PayloadTypes {
        PayloadTypes {
            t140: self.t140_payload_type,
            red: self.red_payload_type,
        }
    }

    pub fn buffer_time(&self) -> Duration {
        Duration::from_millis(self.buffer_time_ms)
    }

    pub fn rtcp_min_interval(&self) -> Duration {
        Duration::from_millis(self.rtcp_min_interval_ms)
    }

    /// Port 0 (ephemeral) stays 0 for RTCP as well.
    pub fn local_rtcp_port(&self) -> u16 {
        self.local_rtcp_port
            .unwrap_or_else(|| next_port(self.local_rtp_port))
    }

    pub fn remote_rtcp_port(&self) -> u16 {
        self.remote_rtcp_port
            .unwrap_or_else(|| next_port(self.remote_rtp_port))
    }

    pub fn local_rtp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.bind_address, self.local_rtp_port)
    }

    pub fn local_rtcp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.bind_address, self.local_rtcp_port())
    }

    pub fn remote_rtp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.remote_host, self.remote_rtp_port)
    }

    pub fn remote_rtcp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.remote_host, self.remote_rtcp_port())
    }

    /// Sets the local RTP port; RTCP follows unless set explicitly.
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_rtp_port = port;
        self
    }

    pub fn with_local_rtcp_port(mut self, port: u16) -> Self {
        self.local_rtcp_port = Some(port);
        self
    }

    pub fn with_remote(mut self, host: &str, rtp_port: u16) -> Self {
        self.remote_host = host.to_string();
        self.remote_rtp_port = rtp_port;
        self
    }

    pub fn with_remote_rtcp_port(mut self, port: u16) -> Self {
        self.remote_rtcp_port = Some(port);
        self
    }

    pub fn with_multicast_group(mut self, group: Ipv4Addr) -> Self {
        self.multicast_group = Some(group);
        self
    }

    pub fn with_payload_types(mut self, t140: u8, red: u8) -> Self {
        self.t140_payload_type = t140;
        self.red_payload_type = red;
        self
    }

    pub fn with_redundancy(mut self, redundancy: RedundancyMode) -> Self {
        self.redundancy = redundancy;
        self
    }

    pub fn with_announce_rfc4103(mut self, announce: bool) -> Self {
        self.announce_rfc4103 = announce;
        self
    }

    pub fn with_buffer_time(mut self, buffer_time: Duration) -> Self {
        self.buffer_time_ms = buffer_time.as_millis() as u64;
        self
    }

    pub fn with_rtcp_bandwidth(mut self, session_bandwidth: f64, rtcp_fraction: f64) -> Self {
        self.session_bandwidth = session_bandwidth;
        self.rtcp_fraction = rtcp_fraction;
        self
    }

    pub fn with_rtcp_min_interval(mut self, interval: Duration) -> Self {
        self.rtcp_min_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_cname(mut self, cname: &str) -> Self {
        self.cname = Some(cname.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

fn next_port(port: u16) -> u16 {
    if port == 0 { 0 } else { port.wrapping_add(1) }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::Config(format!("Cannot resolve {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| NetworkError::Config(format!("No address for {}:{}", host, port)))
}
