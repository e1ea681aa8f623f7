//! Blocking UDP socket wrapper, bounded by an explicit read timeout, with
//! per-socket statistics.
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::{Duration, Instant};

use crate::error::SocketError;
use crate::stats::SocketStats;

/// Maximum size of a single UDP datagram this wrapper will read.
const MAX_UDP_PACKET_SIZE: usize = 65536;

/// UDP socket whose reads block up to whatever `set_read_timeout` was last
/// armed with, rather than returning immediately. `Transport::poll` arms a
/// fresh timeout before every read so the whole poll step never blocks past
/// its caller-supplied budget, without spinning in between.
pub struct UdpSocket {
    socket: StdUdpSocket,
    recv_buffer: Vec<u8>,
    stats: SocketStats,
}

impl UdpSocket {
    /// Creates a new UDP socket bound to the specified address. Blocking by
    /// default; callers bound reads with [`UdpSocket::set_read_timeout`].
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let socket = StdUdpSocket::bind(addr)?;

        Ok(Self {
            socket,
            recv_buffer: vec![0u8; MAX_UDP_PACKET_SIZE],
            stats: SocketStats::default(),
        })
    }

    /// Returns the local address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends data to a specific address.
    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<usize, SocketError> {
        let sent = self.socket.send_to(data, addr)?;
        self.stats.bytes_sent += sent as u64;
        self.stats.packets_sent += 1;
        self.stats.last_send_time = Some(Instant::now());
        Ok(sent)
    }

    /// Receives a datagram from any address (returns data slice and sender address).
    /// Blocks until one arrives or the armed read timeout (if any) elapses,
    /// in which case it returns `Err(SocketError::WouldBlock)`.
    pub fn recv_from(&mut self) -> Result<(&[u8], SocketAddr), SocketError> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, addr)) => {
                self.stats.bytes_received += len as u64;
                self.stats.packets_received += 1;
                self.stats.last_receive_time = Some(Instant::now());
                Ok((&self.recv_buffer[..len], addr))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sets the read timeout `recv_from` blocks for. `Transport::poll` calls
    /// this before every read, re-arming it with whatever budget remains.
    pub fn set_read_timeout(&self, dur: Option<Duration>) -> Result<(), SocketError> {
        self.socket.set_read_timeout(dur)?;
        Ok(())
    }

    /// Returns socket statistics.
    pub fn stats(&self) -> &SocketStats {
        &self.stats
    }
}
