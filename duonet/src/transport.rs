//! Transport facade: the public surface. Multiplexes the reliable and
//! unreliable channels over one UDP socket and drives the poll loop: read
//! the socket (blocking up to the caller's timeout), dispatch by packet
//! kind, then flush sends. No handshake or connection state machine — both
//! endpoints are assumed to agree on parameters out of band.
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::RtoEstimator;
use crate::config::TransportConfig;
use crate::error::{SocketError, TransportError};
use crate::receiver::ReliableReceiver;
use crate::sender::ReliableSender;
use crate::socket::UdpSocket;
use crate::stats::TransportStats;
use crate::unreliable::UnreliablePath;
use crate::wire::{self, ChannelType, Packet, SackBlock};
use smallvec::SmallVec;

/// Dual-channel UDP transport: a selective-repeat reliable byte stream plus
/// a fire-and-forget unreliable channel, multiplexed over one socket.
pub struct Transport {
    config: TransportConfig,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    closed: bool,

    reliable_sender: ReliableSender,
    reliable_receiver: ReliableReceiver,
    unreliable: UnreliablePath,

    rng: StdRng,
    start: Instant,

    malformed_dropped: u64,
    unreliable_sent: u64,
    unreliable_received: u64,
    send_buf: Vec<u8>,

    /// Encoded datagrams produced by `transmit()` when no socket is bound,
    /// drained via `collect_outgoing()`. Populated only when this transport
    /// is being driven by `tick()`/`inject()` instead of `poll()` — e.g. by
    /// the deterministic network simulator.
    outgoing: Vec<Vec<u8>>,
}

impl Transport {
    /// Creates a new, unbound, unconnected transport instance.
    pub fn new(window: u32, prob_reliable: f64, verbose: bool) -> Result<Self, TransportError> {
        Self::with_config(TransportConfig::new(window, prob_reliable, verbose)?)
    }

    /// Creates a transport from a fully specified configuration.
    pub fn with_config(config: TransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let rto = RtoEstimator::new(
            config.initial_rto,
            config.min_rto,
            config.max_rto,
            config.clock_granularity,
        );
        Ok(Self {
            reliable_sender: ReliableSender::new(ChannelType::Reliable, config.window, config.mss, rto),
            reliable_receiver: ReliableReceiver::new(config.window, config.sack_enabled, config.sack_max_blocks),
            unreliable: UnreliablePath::new(),
            rng: StdRng::from_entropy(),
            start: Instant::now(),
            socket: None,
            peer: None,
            closed: false,
            malformed_dropped: 0,
            unreliable_sent: 0,
            unreliable_received: 0,
            send_buf: Vec::with_capacity(1472),
            outgoing: Vec::new(),
            config,
        })
    }

    /// Like [`Transport::with_config`], but seeds the channel-assignment RNG
    /// deterministically for reproducible tests.
    pub fn with_config_seeded(config: TransportConfig, seed: u64) -> Result<Self, TransportError> {
        let mut transport = Self::with_config(config)?;
        transport.rng = StdRng::seed_from_u64(seed);
        Ok(transport)
    }

    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyBound);
        }
        self.socket = Some(UdpSocket::bind(addr).map_err(TransportError::Socket)?);
        Ok(())
    }

    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if self.peer.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        self.peer = Some(addr);
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .local_addr()
            .map_err(TransportError::Socket)
    }

    /// Accepts application bytes, splitting the offered slice segment by
    /// segment across the reliable and unreliable channels by independent
    /// Bernoulli draws. Returns the byte count actually accepted; any
    /// remainder (the reliable window was full) must be re-offered later.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.ensure_open()?;
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }

        let mss = self.config.mss;
        let mut accepted = 0;
        let mut offset = 0;
        while offset < data.len() {
            let take = (data.len() - offset).min(mss);
            let chunk = &data[offset..offset + take];
            if self.rng.gen::<f64>() < self.config.prob_reliable {
                let n = self.reliable_sender.queue(chunk);
                accepted += n;
                if n < chunk.len() {
                    break; // reliable window full; stop offering more
                }
            } else {
                self.send_unreliable_segment(chunk)?;
                accepted += take;
            }
            offset += take;
        }
        Ok(accepted)
    }

    /// Sends `bytes` unconditionally on the unreliable channel, bypassing
    /// the `prob_reliable` draw.
    pub fn send_unreliable(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }
        for chunk in bytes.chunks(self.config.mss) {
            self.send_unreliable_segment(chunk)?;
        }
        Ok(())
    }

    fn send_unreliable_segment(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        let seq_no = self.unreliable.next_seq();
        self.unreliable_sent += 1;
        let packet = Packet::Data {
            channel: ChannelType::Unreliable,
            seq_no,
            timestamp: self.now_ms() as u32,
            payload: chunk.to_vec(),
        };
        self.transmit(&packet)
    }

    pub fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        Ok(self.reliable_receiver.recv(max_bytes))
    }

    /// Pops the oldest undelivered unreliable payload, if any.
    pub fn recv_unreliable(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_open()?;
        Ok(self.unreliable.recv())
    }

    /// One poll step: transmit due reliable segments, then block on the
    /// socket for up to `timeout_ms` waiting for datagrams (re-arming a
    /// shrinking read timeout after each one so the whole step never
    /// exceeds the budget), dispatch each datagram, and emit any feedback
    /// the receiver owes the peer. The socket read is the only blocking
    /// primitive here — an idle `poll` sleeps instead of spinning.
    pub fn poll(&mut self, timeout_ms: u64) -> Result<(), TransportError> {
        self.ensure_open()?;

        let now = self.now_ms();
        let due = self.reliable_sender.collect_due(now);
        for packet in due {
            self.transmit(&packet)?;
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let received = {
                let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;
                socket.set_read_timeout(Some(remaining)).map_err(TransportError::Socket)?;
                match socket.recv_from() {
                    Ok((data, _from)) => Some(data.to_vec()),
                    Err(SocketError::WouldBlock) => None,
                    Err(e) => return Err(TransportError::Socket(e)),
                }
            };

            match received {
                Some(data) => {
                    let now = self.now_ms();
                    self.handle_datagram(&data, now);
                }
                None => break,
            }
        }

        let now = self.now_ms() as u32;
        self.emit_feedback(now)?;
        Ok(())
    }

    /// Harness hook: transmits due reliable segments (new sends, timer-driven
    /// retransmits) and any feedback the receiver owes, at the given virtual
    /// time, without touching a socket. Pairs with [`Transport::inject`] and
    /// [`Transport::collect_outgoing`] to drive a transport through
    /// something other than a real UDP socket — e.g. the deterministic
    /// network simulator.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), TransportError> {
        self.ensure_open()?;
        let due = self.reliable_sender.collect_due(now_ms);
        for packet in due {
            self.transmit(&packet)?;
        }
        self.emit_feedback(now_ms as u32)?;
        Ok(())
    }

    /// Harness hook: decodes and dispatches `data` as though it had just
    /// arrived on the socket, at the given virtual time. See
    /// [`Transport::tick`].
    pub fn inject(&mut self, data: &[u8], now_ms: u64) {
        self.handle_datagram(data, now_ms);
    }

    /// Harness hook: drains every datagram this transport has encoded since
    /// the last call. Only populated when no socket is bound — i.e. while
    /// this transport is being driven by `tick()`/`inject()` rather than
    /// `poll()`.
    pub fn collect_outgoing(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outgoing)
    }

    fn handle_datagram(&mut self, data: &[u8], now: u64) {
        let packet = match wire::decode(data) {
            Ok(p) => p,
            Err(_) => {
                self.malformed_dropped += 1;
                return;
            }
        };

        match packet {
            Packet::Data { channel, seq_no, payload, .. } => match channel {
                ChannelType::Reliable => self.reliable_receiver.on_data(seq_no, &payload),
                ChannelType::Unreliable => {
                    self.unreliable.on_data(&payload);
                    self.unreliable_received += 1;
                }
            },
            Packet::Ack { ack_no, recv_window, .. } => {
                self.reliable_sender.on_ack(ack_no, recv_window, now);
            }
            Packet::Sack {
                ack_no,
                recv_window,
                blocks,
                ..
            } => {
                let repaired = self.reliable_sender.on_sack(ack_no, &blocks, recv_window, now);
                for packet in repaired {
                    let _ = self.transmit(&packet);
                }
            }
        }
    }

    fn emit_feedback(&mut self, now: u32) -> Result<(), TransportError> {
        if let Some(feedback) = self.reliable_receiver.take_feedback() {
            let packet = if feedback.sack_blocks.is_empty() {
                Packet::Ack {
                    channel: ChannelType::Reliable,
                    seq_no: 0,
                    timestamp: now,
                    ack_no: feedback.ack_no,
                    recv_window: feedback.recv_window,
                    echo_timestamp: now,
                }
            } else {
                let mut blocks: SmallVec<[SackBlock; 4]> = SmallVec::new();
                blocks.extend(feedback.sack_blocks);
                Packet::Sack {
                    channel: ChannelType::Reliable,
                    seq_no: 0,
                    timestamp: now,
                    ack_no: feedback.ack_no,
                    recv_window: feedback.recv_window,
                    echo_timestamp: now,
                    blocks,
                }
            };
            self.transmit(&packet)?;
        }
        Ok(())
    }

    /// Encodes `packet` and hands it to the socket if one is bound;
    /// otherwise buffers it for `collect_outgoing()`, so a harness-driven
    /// transport (no socket, no real peer) can still accumulate outgoing
    /// traffic instead of erroring.
    fn transmit(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let peer = self.peer.ok_or(TransportError::NotConnected)?;
        wire::encode_into(packet, &mut self.send_buf);
        match self.socket.as_mut() {
            Some(socket) => {
                socket.send_to(&self.send_buf, peer).map_err(TransportError::Socket)?;
            }
            None => self.outgoing.push(self.send_buf.clone()),
        }
        Ok(())
    }

    /// Repeatedly polls with a bounded slice until the reliable sender's
    /// in-flight window is empty or `deadline` is reached.
    pub fn drain(&mut self, deadline: Duration) -> Result<(), TransportError> {
        self.ensure_open()?;
        let start = Instant::now();
        let slice_ms = self.config.drain_poll_slice.as_millis() as u64;
        while !self.reliable_sender.is_drained() {
            if start.elapsed() >= deadline {
                return Err(TransportError::DrainTimeout);
            }
            self.poll(slice_ms)?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.socket = None;
    }

    pub fn stats(&self) -> TransportStats {
        let mut reliable = self.reliable_sender.stats();
        reliable.rcv_base = self.reliable_receiver.rcv_base();
        reliable.reorder_buffer_occupancy = self.reliable_receiver.reorder_buffer_occupancy();
        TransportStats {
            reliable,
            unreliable_sent: self.unreliable_sent,
            unreliable_received: self.unreliable_received,
            malformed_dropped: self.malformed_dropped,
            socket: self
                .socket
                .as_ref()
                .map(|s| s.stats().clone())
                .unwrap_or_default(),
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
