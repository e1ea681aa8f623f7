//! Consolidated statistics types. Purely observational: nothing here feeds
//! back into protocol decisions.
use std::time::Instant;

/// Per-socket counters, updated by [`crate::socket::UdpSocket`] on every call.
#[derive(Debug, Default, Clone)]
pub struct SocketStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_receive_time: Option<Instant>,
    pub last_send_time: Option<Instant>,
}

/// Reliability-channel counters, sourced from the sender and receiver state
/// machines (segments, not raw datagrams).
#[derive(Debug, Clone, Default)]
pub struct ReliabilityStats {
    pub segments_in_flight: usize,
    pub send_base: u32,
    pub next_seq: u32,
    pub rcv_base: u32,
    pub reorder_buffer_occupancy: usize,
    pub srtt_ms: f64,
    pub rttvar_ms: f64,
    pub rto_ms: f64,
    pub total_sent: u64,
    pub total_retransmitted: u64,
    pub total_acked: u64,
    pub duplicate_acks: u64,
}

/// Snapshot of transport-wide counters returned by `Transport::stats()`.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub reliable: ReliabilityStats,
    pub unreliable_sent: u64,
    pub unreliable_received: u64,
    pub malformed_dropped: u64,
    pub socket: SocketStats,
}
