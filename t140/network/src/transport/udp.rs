//! UDP transport for RTP and RTCP datagrams

use crate::error::{NetworkError, Result};
use logging::Logger;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

const MAX_DATAGRAM: usize = 65536;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
}

/// UDP socket with an optional fixed remote peer.
///
/// Receives block for at most the configured read timeout so worker
/// threads can poll their stop flags.
pub struct UdpTransport {
    socket: UdpSocket,
    remote_addr: Option<SocketAddr>,
    logger: Logger,
    stats: TransportStats,
}

impl UdpTransport {
    /// Binds a blocking socket.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Network`] when the address cannot be bound.
    pub fn new(bind_addr: SocketAddr, logger: Logger) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).map_err(|e| {
            NetworkError::Network(format!("Error binding UDP socket to {}: {}", bind_addr, e))
        })?;

        logger.info(&format!(
            "UDP socket bound to {}",
            socket.local_addr().unwrap_or(bind_addr)
        ));

        Ok(UdpTransport {
            socket,
            remote_addr: None,
            logger,
            stats: TransportStats::default(),
        })
    }

    /// Second handle on the same socket with its own counters, so one thread
    /// can send while another receives.
    pub fn try_clone(&self) -> Result<Self> {
        let socket = self
            .socket
            .try_clone()
            .map_err(|e| NetworkError::Network(format!("Error cloning socket: {}", e)))?;
        Ok(UdpTransport {
            socket,
            remote_addr: self.remote_addr,
            logger: self.logger.clone(),
            stats: TransportStats::default(),
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(|e| NetworkError::Network(format!("Error setting read timeout: {}", e)))
    }

    /// Joins an IPv4 multicast group on `interface` (unspecified = any).
    pub fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
        self.socket
            .join_multicast_v4(&group, &interface)
            .map_err(|e| NetworkError::Network(format!("Error joining {}: {}", group, e)))?;
        self.logger.info(&format!("Joined multicast group {}", group));
        Ok(())
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.logger.info(&format!("Remote address set to {}", addr));
        self.remote_addr = Some(addr);
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::Network(format!("Error reading local address: {}", e)))
    }

    /// Sends one datagram to the remote peer.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let remote_addr = self
            .remote_addr
            .ok_or_else(|| NetworkError::Network("Remote address not set".to_string()))?;
        let sent = self
            .socket
            .send_to(data, remote_addr)
            .map_err(|e| NetworkError::Network(format!("Error sending to {}: {}", remote_addr, e)))?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += sent as u64;
        Ok(sent)
    }

    /// Waits for one datagram.
    ///
    /// # Returns
    /// * `Ok(Some((data, addr)))` - Datagram and sender address
    /// * `Ok(None)` - Read timeout elapsed
    /// * `Err` - Socket error
    pub fn receive(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        match self.socket.recv_from(&mut buf) {
            Ok((size, addr)) => {
                buf.truncate(size);
                self.stats.packets_received += 1;
                self.stats.bytes_received += size as u64;
                Ok(Some((buf, addr)))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(NetworkError::Network(format!("Error receiving: {}", e))),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }
}
