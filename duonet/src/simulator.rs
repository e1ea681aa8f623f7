//! Deterministic in-process network simulator for exercising loss, latency,
//! jitter, duplication, and reordering without real sockets or sleeps.
//!
//! Driven by an explicit virtual clock (`advance`) instead of
//! `thread::sleep` and wall-clock polling, and seeded so a failing scenario
//! reproduces.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BinaryHeap;
use std::net::SocketAddr;

/// Loss/latency/reorder parameters for one [`NetworkSimulator`] instance.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability in `[0, 1]` that a given datagram is dropped in transit.
    pub packet_loss: f64,
    /// Base one-way latency applied to every delivered datagram.
    pub latency_ms: u64,
    /// Maximum jitter added on top of `latency_ms`, uniformly distributed.
    pub jitter_ms: u64,
    /// Probability that a delivered datagram is additionally duplicated once.
    pub duplicate_chance: f64,
    /// Probability that a datagram's delivery is perturbed to arrive out of
    /// the order it was sent (implemented as added negative jitter against
    /// the previous datagram's scheduled arrival).
    pub out_of_order_chance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            packet_loss: 0.0,
            latency_ms: 0,
            jitter_ms: 0,
            duplicate_chance: 0.0,
            out_of_order_chance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct InFlightDatagram {
    arrival_ms: u64,
    seq: u64, // tiebreaker so BinaryHeap ordering is deterministic for equal arrival times
    data: Vec<u8>,
    from: SocketAddr,
    to: SocketAddr,
}

impl Ord for InFlightDatagram {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we want earliest arrival first.
        other
            .arrival_ms
            .cmp(&self.arrival_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for InFlightDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A datagram that has arrived at its destination per the virtual clock.
#[derive(Debug, Clone)]
pub struct DeliveredDatagram {
    pub data: Vec<u8>,
    pub from: SocketAddr,
    pub to: SocketAddr,
}

/// Applies loss, latency, jitter, duplication, and reordering to datagrams
/// injected via [`NetworkSimulator::send`], releasing them through
/// [`NetworkSimulator::advance`] once the virtual clock reaches their
/// scheduled arrival time.
pub struct NetworkSimulator {
    config: SimulationConfig,
    rng: StdRng,
    now_ms: u64,
    next_seq: u64,
    in_flight: BinaryHeap<InFlightDatagram>,
    last_arrival_ms: Option<u64>,

    sent: u64,
    dropped: u64,
    duplicated: u64,
}

impl NetworkSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_seed(config, 0)
    }

    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            now_ms: 0,
            next_seq: 0,
            in_flight: BinaryHeap::new(),
            last_arrival_ms: None,
            sent: 0,
            dropped: 0,
            duplicated: 0,
        }
    }

    /// Injects one datagram into the link. May be dropped per `packet_loss`;
    /// otherwise scheduled for arrival at `now + latency + jitter`.
    pub fn send(&mut self, data: &[u8], from: SocketAddr, to: SocketAddr) {
        self.sent += 1;
        if self.rng.gen::<f64>() < self.config.packet_loss {
            self.dropped += 1;
            return;
        }

        self.schedule(data, from, to);

        if self.rng.gen::<f64>() < self.config.duplicate_chance {
            self.duplicated += 1;
            self.schedule(data, from, to);
        }
    }

    fn schedule(&mut self, data: &[u8], from: SocketAddr, to: SocketAddr) {
        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let mut arrival_ms = self.now_ms + self.config.latency_ms + jitter;

        if self.rng.gen::<f64>() < self.config.out_of_order_chance {
            if let Some(prev) = self.last_arrival_ms {
                arrival_ms = arrival_ms.min(prev.saturating_sub(1));
            }
        }
        self.last_arrival_ms = Some(arrival_ms);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.push(InFlightDatagram {
            arrival_ms,
            seq,
            data: data.to_vec(),
            from,
            to,
        });
    }

    /// Advances the virtual clock by `delta_ms` and returns every datagram
    /// whose scheduled arrival time is now due.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<DeliveredDatagram> {
        self.now_ms += delta_ms;
        let mut delivered = Vec::new();
        while let Some(top) = self.in_flight.peek() {
            if top.arrival_ms > self.now_ms {
                break;
            }
            let datagram = self.in_flight.pop().unwrap();
            delivered.push(DeliveredDatagram {
                data: datagram.data,
                from: datagram.from,
                to: datagram.to,
            });
        }
        delivered
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn duplicated_count(&self) -> u64 {
        self.duplicated
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
