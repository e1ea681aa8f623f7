//! Reliable sender: segmentation, sliding window, per-segment retransmission
//! timers, and SACK-driven fast repair. Generalizes in-flight tracking from
//! a flat ack-bitfield to a contiguous `send_base..next_seq` window
//! addressed by 32-bit sequence numbers, since this protocol has no
//! handshake-negotiated channel ids.
use crate::clock::RtoEstimator;
use crate::stats::ReliabilityStats;
use crate::util::{sequence_greater_than, sequence_less_than};
use crate::wire::{ChannelType, Packet, SackBlock};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Unsent,
    InFlight,
    /// SACKed but not yet cumulatively retired; no longer due for retransmit.
    Acked,
}

#[derive(Debug)]
struct Segment {
    payload: Vec<u8>,
    state: SegmentState,
    first_sent_ms: Option<u64>,
    retx_count: u32,
    deadline_ms: u64,
    timeout: Duration,
}

/// Sliding-window selective-repeat sender for one reliable flow.
pub struct ReliableSender {
    channel: ChannelType,
    segments: VecDeque<Segment>,
    send_base: u32,
    next_seq: u32,
    window: u32,
    mss: usize,
    peer_recv_window: u16,
    rto: RtoEstimator,

    total_sent: u64,
    total_retransmitted: u64,
    total_acked: u64,
    duplicate_acks: u64,
}

impl ReliableSender {
    pub fn new(channel: ChannelType, window: u32, mss: usize, rto: RtoEstimator) -> Self {
        Self {
            channel,
            segments: VecDeque::new(),
            send_base: 0,
            next_seq: 0,
            window,
            mss,
            peer_recv_window: u16::MAX,
            rto,
            total_sent: 0,
            total_retransmitted: 0,
            total_acked: 0,
            duplicate_acks: 0,
        }
    }

    /// Number of segments that may still be created before the window fills.
    fn free_slots(&self) -> u32 {
        self.window - (self.next_seq.wrapping_sub(self.send_base))
    }

    /// Carves `data` into `mss`-sized segments and appends them unsent,
    /// gated by the in-flight window. Returns the byte count actually
    /// accepted; the caller must re-offer any remainder later.
    pub fn queue(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        let mut remaining = data;
        while !remaining.is_empty() && self.free_slots() > 0 {
            let take = remaining.len().min(self.mss);
            let (chunk, rest) = remaining.split_at(take);
            self.segments.push_back(Segment {
                payload: chunk.to_vec(),
                state: SegmentState::Unsent,
                first_sent_ms: None,
                retx_count: 0,
                deadline_ms: 0,
                timeout: self.rto.rto(),
            });
            self.next_seq = self.next_seq.wrapping_add(1);
            accepted += take;
            remaining = rest;
        }
        accepted
    }

    /// Returns packets that must go out this poll step: never-sent segments
    /// (unless the peer is advertising a zero window) and reliable segments
    /// whose retransmit deadline has passed.
    pub fn collect_due(&mut self, now_ms: u64) -> Vec<Packet> {
        let mut due = Vec::new();
        let zero_window = self.peer_recv_window == 0;

        for (i, segment) in self.segments.iter_mut().enumerate() {
            let seq_no = self.send_base.wrapping_add(i as u32);
            match segment.state {
                SegmentState::Acked => continue,
                SegmentState::Unsent => {
                    if zero_window {
                        continue;
                    }
                    segment.state = SegmentState::InFlight;
                    segment.first_sent_ms.get_or_insert(now_ms);
                    segment.timeout = self.rto.rto();
                    segment.deadline_ms = now_ms + segment.timeout.as_millis() as u64;
                    self.total_sent += 1;
                    due.push(Packet::Data {
                        channel: self.channel,
                        seq_no,
                        timestamp: now_ms as u32,
                        payload: segment.payload.clone(),
                    });
                }
                SegmentState::InFlight => {
                    if now_ms >= segment.deadline_ms {
                        segment.retx_count += 1;
                        segment.timeout = self.rto.backoff(segment.timeout);
                        segment.deadline_ms = now_ms + segment.timeout.as_millis() as u64;
                        self.total_retransmitted += 1;
                        due.push(Packet::Data {
                            channel: self.channel,
                            seq_no,
                            timestamp: now_ms as u32,
                            payload: segment.payload.clone(),
                        });
                    }
                }
            }
        }

        due
    }

    /// Processes a cumulative ACK: retires everything below `ack_no`,
    /// samples one unambiguous RTT (Karn's algorithm), and records the
    /// peer's advertised window.
    pub fn on_ack(&mut self, ack_no: u32, peer_recv_window: u16, now_ms: u64) {
        self.peer_recv_window = peer_recv_window;

        if ack_no == self.send_base {
            self.duplicate_acks += 1;
            return;
        }
        if !sequence_greater_than(ack_no, self.send_base) {
            return;
        }

        while sequence_less_than(self.send_base, ack_no) {
            let segment = match self.segments.pop_front() {
                Some(s) => s,
                None => break,
            };
            self.total_acked += 1;
            let is_last_retired = self.send_base.wrapping_add(1) == ack_no;
            if is_last_retired && segment.retx_count == 0 {
                if let Some(sent_ms) = segment.first_sent_ms {
                    let sample_ms = now_ms.saturating_sub(sent_ms) as f64;
                    self.rto.on_rtt_sample(sample_ms);
                }
            }
            self.send_base = self.send_base.wrapping_add(1);
        }
    }

    /// Processes a SACK: marks reported ranges acked (canceling their
    /// timers), then fast-repairs segments below the lowest reported range
    /// that remain unacked. Returns the retransmitted packets, which must be
    /// sent immediately rather than waiting on the next `collect_due`.
    pub fn on_sack(&mut self, ack_no: u32, blocks: &[SackBlock], peer_recv_window: u16, now_ms: u64) -> Vec<Packet> {
        self.on_ack(ack_no, peer_recv_window, now_ms);

        if blocks.is_empty() {
            return Vec::new();
        }

        for &(start, end) in blocks {
            let mut seq = start;
            loop {
                self.mark_acked(seq);
                if seq == end {
                    break;
                }
                seq = seq.wrapping_add(1);
            }
        }

        let lowest_start = blocks.iter().map(|&(start, _)| start).fold(blocks[0].0, |acc, s| {
            if sequence_less_than(s, acc) {
                s
            } else {
                acc
            }
        });

        let mut repaired = Vec::new();
        let mut seq = self.send_base;
        while sequence_less_than(seq, lowest_start) {
            if let Some(packet) = self.fast_repair(seq, now_ms) {
                repaired.push(packet);
            }
            seq = seq.wrapping_add(1);
        }
        repaired
    }

    fn index_of(&self, seq_no: u32) -> Option<usize> {
        if sequence_less_than(seq_no, self.send_base) || !sequence_less_than(seq_no, self.next_seq) {
            return None;
        }
        Some(seq_no.wrapping_sub(self.send_base) as usize)
    }

    fn mark_acked(&mut self, seq_no: u32) {
        if let Some(i) = self.index_of(seq_no) {
            if let Some(segment) = self.segments.get_mut(i) {
                segment.state = SegmentState::Acked;
            }
        }
    }

    /// Immediately retransmits the segment at `seq_no`, if it exists and is
    /// not already cumulatively acked, returning the packet to send now.
    fn fast_repair(&mut self, seq_no: u32, now_ms: u64) -> Option<Packet> {
        let i = self.index_of(seq_no)?;
        let channel = self.channel;
        let segment = self.segments.get_mut(i)?;
        if segment.state == SegmentState::Acked {
            return None;
        }
        segment.retx_count += 1;
        segment.timeout = self.rto.backoff(segment.timeout);
        segment.deadline_ms = now_ms + segment.timeout.as_millis() as u64;
        segment.state = SegmentState::InFlight;
        self.total_retransmitted += 1;
        Some(Packet::Data {
            channel,
            seq_no,
            timestamp: now_ms as u32,
            payload: segment.payload.clone(),
        })
    }

    pub fn is_drained(&self) -> bool {
        self.send_base == self.next_seq
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn segments_in_flight(&self) -> usize {
        self.segments.len()
    }

    pub fn stats(&self) -> ReliabilityStats {
        ReliabilityStats {
            segments_in_flight: self.segments.len(),
            send_base: self.send_base,
            next_seq: self.next_seq,
            rcv_base: 0,
            reorder_buffer_occupancy: 0,
            srtt_ms: self.rto.srtt_ms(),
            rttvar_ms: self.rto.rttvar_ms(),
            rto_ms: self.rto.rto().as_millis() as f64,
            total_sent: self.total_sent,
            total_retransmitted: self.total_retransmitted,
            total_acked: self.total_acked,
            duplicate_acks: self.duplicate_acks,
        }
    }
}
