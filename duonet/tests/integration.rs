use duonet::prelude::*;
use duonet::{wire, NetworkSimulator, SimulationConfig};
use duonet::{ChannelType, Packet};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

fn loopback() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

fn connected_pair(window: u32, prob_reliable: f64) -> (Transport, Transport) {
    let mut a = Transport::new(window, prob_reliable, false).unwrap();
    let mut b = Transport::new(window, prob_reliable, false).unwrap();
    a.bind(loopback()).unwrap();
    b.bind(loopback()).unwrap();
    let a_addr = a.local_addr().unwrap();
    let b_addr = b.local_addr().unwrap();
    a.connect(b_addr).unwrap();
    b.connect(a_addr).unwrap();
    (a, b)
}

fn pump_until(deadline: Duration, mut step: impl FnMut() -> bool) {
    let start = Instant::now();
    loop {
        if step() {
            return;
        }
        assert!(start.elapsed() < deadline, "scenario did not converge in time");
    }
}

#[test]
fn test_lossless_reliable_stream_delivers_in_order() {
    let (mut a, mut b) = connected_pair(32, 1.0);
    let payload: Vec<u8> = (0u8..=255).collect();

    let mut offset = 0;
    while offset < payload.len() {
        offset += a.send(&payload[offset..]).unwrap();
        a.poll(5).unwrap();
    }

    let mut delivered = Vec::new();
    pump_until(Duration::from_secs(5), || {
        a.poll(5).unwrap();
        b.poll(5).unwrap();
        delivered.extend(b.recv(4096).unwrap());
        delivered.len() == payload.len()
    });

    assert_eq!(delivered, payload);
    assert_eq!(a.stats().reliable.total_retransmitted, 0);
}

#[test]
fn test_unreliable_stream_no_ordering_guarantee_but_no_duplication_required() {
    let (mut a, mut b) = connected_pair(32, 0.0);
    for i in 0u8..20 {
        a.send(&[i]).unwrap();
    }

    let mut received = Vec::new();
    pump_until(Duration::from_secs(5), || {
        a.poll(5).unwrap();
        b.poll(5).unwrap();
        while let Some(bytes) = b.recv_unreliable().unwrap() {
            received.push(bytes[0]);
        }
        received.len() == 20
    });

    received.sort();
    assert_eq!(received, (0u8..20).collect::<Vec<_>>());
}

#[test]
fn test_drain_returns_once_window_empty() {
    let (mut a, mut b) = connected_pair(8, 1.0);
    a.send(b"short message").unwrap();

    // The peer must be polled concurrently so its feedback reaches `a`;
    // drive both from a background thread while `a` drains in the foreground.
    let handle = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut delivered = Vec::new();
        while delivered != b"short message" && Instant::now() < deadline {
            b.poll(5).unwrap();
            delivered.extend(b.recv(4096).unwrap());
        }
        delivered
    });

    a.drain(Duration::from_secs(5)).unwrap();
    assert!(a.stats().reliable.segments_in_flight == 0);

    let delivered = handle.join().unwrap();
    assert_eq!(delivered, b"short message");
}

#[test]
fn test_send_accepts_fewer_bytes_when_window_full() {
    let config = TransportConfig {
        window: 1,
        mss: 4,
        ..Default::default()
    };
    let mut a = Transport::with_config(config).unwrap();
    a.bind(loopback()).unwrap();
    a.connect(loopback()).unwrap();
    let accepted = a.send(b"abcdefgh").unwrap();
    assert_eq!(accepted, 4, "only one mss-sized segment fits in a window of 1");
}

// --- Simulator-driven scenarios (spec §8) -----------------------------
//
// The tests below drive a pair of `Transport`s without any real socket:
// `tick`/`inject`/`collect_outgoing` hand the encoded wire format to a
// `NetworkSimulator`, which applies loss/latency/jitter/reorder on a virtual
// clock and hands datagrams back. This exercises the codec and both state
// machines exactly as they would run over a real socket, just without one.

fn sim_addrs() -> (SocketAddr, SocketAddr) {
    (
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40001),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40002),
    )
}

/// Advances both endpoints one virtual-time step: transmit whatever is due,
/// hand every encoded datagram to `sim`, advance the virtual clock, and
/// inject whatever `sim` says has arrived.
fn relay_step(
    a: &mut Transport,
    b: &mut Transport,
    a_addr: SocketAddr,
    b_addr: SocketAddr,
    sim: &mut NetworkSimulator,
    now_ms: &mut u64,
    step_ms: u64,
) {
    a.tick(*now_ms).unwrap();
    b.tick(*now_ms).unwrap();

    for datagram in a.collect_outgoing() {
        sim.send(&datagram, a_addr, b_addr);
    }
    for datagram in b.collect_outgoing() {
        sim.send(&datagram, b_addr, a_addr);
    }

    *now_ms += step_ms;
    for delivered in sim.advance(step_ms) {
        if delivered.to == a_addr {
            a.inject(&delivered.data, *now_ms);
        } else if delivered.to == b_addr {
            b.inject(&delivered.data, *now_ms);
        }
    }
}

#[test]
fn test_sack_of_later_segment_triggers_fast_repair_and_in_order_delivery() {
    // The peer's first SACK acknowledges segment 1 before segment 0 has been
    // seen; segment 0 must be fast-repaired, and the final delivery must
    // still be in the original order.
    let config = TransportConfig {
        window: 4,
        mss: 4,
        sack_enabled: true,
        ..Default::default()
    };
    let (a_addr, b_addr) = sim_addrs();
    let mut a = Transport::with_config(config.clone()).unwrap();
    let mut b = Transport::with_config(config).unwrap();
    a.connect(b_addr).unwrap();
    b.connect(a_addr).unwrap();

    a.send(b"abcdefgh").unwrap(); // two segments: "abcd" (seq 0), "efgh" (seq 1)

    a.tick(0).unwrap();
    let first_round = a.collect_outgoing();
    assert_eq!(first_round.len(), 2, "both segments transmitted on the first tick");

    // Deliver only the second segment to the receiver.
    b.inject(&first_round[1], 10);
    b.tick(10).unwrap();
    let feedback = b.collect_outgoing();
    assert_eq!(feedback.len(), 1);
    match wire::decode(&feedback[0]) {
        Ok(Packet::Sack { ack_no, blocks, .. }) => {
            assert_eq!(ack_no, 0, "rcv_base has not advanced past the gap");
            assert_eq!(blocks.iter().copied().collect::<Vec<_>>(), vec![(1u32, 1u32)]);
        }
        other => panic!("expected a SACK reporting the gap below segment 1, got {:?}", other),
    }

    // The sender fast-repairs segment 0 immediately on receipt of that SACK.
    a.inject(&feedback[0], 20);
    let repaired = a.collect_outgoing();
    assert_eq!(repaired.len(), 1, "only the segment below the SACKed range is repaired");
    match wire::decode(&repaired[0]) {
        Ok(Packet::Data { seq_no: 0, .. }) => {}
        other => panic!("expected segment 0 retransmitted, got {:?}", other),
    }

    // Deliver the repaired segment 0; the receiver now has both segments and
    // must deliver them in the original order.
    b.inject(&repaired[0], 30);
    assert_eq!(b.recv(16).unwrap(), b"abcdefgh");
}

#[test]
fn test_twenty_percent_loss_reliable_stream_recovers_in_order() {
    // Spec §8 scenario 2: 20% uniform loss, 50ms latency, W=32, SACK on.
    let config = TransportConfig {
        window: 32,
        mss: 2,
        sack_enabled: true,
        ..Default::default()
    };
    let (a_addr, b_addr) = sim_addrs();
    let mut a = Transport::with_config(config.clone()).unwrap();
    let mut b = Transport::with_config(config).unwrap();
    a.connect(b_addr).unwrap();
    b.connect(a_addr).unwrap();

    let payload: Vec<u8> = (0u16..300).flat_map(|i| i.to_be_bytes()).collect();

    let sim_config = SimulationConfig {
        packet_loss: 0.2,
        latency_ms: 50,
        ..Default::default()
    };
    let mut sim = NetworkSimulator::with_seed(sim_config, 11);
    let mut now_ms = 0u64;
    let mut offset = 0;
    let mut delivered = Vec::new();

    for _ in 0..200_000 {
        if offset < payload.len() {
            offset += a.send(&payload[offset..]).unwrap();
        }
        relay_step(&mut a, &mut b, a_addr, b_addr, &mut sim, &mut now_ms, 5);
        delivered.extend(b.recv(4096).unwrap());
        if offset == payload.len() && delivered.len() == payload.len() {
            break;
        }
    }

    assert_eq!(delivered, payload, "every byte is eventually delivered despite 20% loss");
    let stats = a.stats();
    assert!(
        stats.reliable.total_retransmitted > 0,
        "20% loss must force at least one retransmission"
    );
}

#[test]
fn test_twenty_percent_reorder_reliable_stream_stays_in_order() {
    // Spec §8 scenario 3: 20% reorder, 0% loss, SACK on; bounded reorder
    // buffer occupancy.
    let window = 16u32;
    let config = TransportConfig {
        window,
        mss: 2,
        sack_enabled: true,
        ..Default::default()
    };
    let (a_addr, b_addr) = sim_addrs();
    let mut a = Transport::with_config(config.clone()).unwrap();
    let mut b = Transport::with_config(config).unwrap();
    a.connect(b_addr).unwrap();
    b.connect(a_addr).unwrap();

    let payload: Vec<u8> = (0u16..100).flat_map(|i| i.to_be_bytes()).collect();

    let sim_config = SimulationConfig {
        latency_ms: 20,
        jitter_ms: 5,
        out_of_order_chance: 0.2,
        ..Default::default()
    };
    let mut sim = NetworkSimulator::with_seed(sim_config, 5);
    let mut now_ms = 0u64;
    let mut offset = 0;
    let mut delivered = Vec::new();
    let mut peak_occupancy = 0usize;

    for _ in 0..200_000 {
        if offset < payload.len() {
            offset += a.send(&payload[offset..]).unwrap();
        }
        relay_step(&mut a, &mut b, a_addr, b_addr, &mut sim, &mut now_ms, 5);
        peak_occupancy = peak_occupancy.max(b.stats().reliable.reorder_buffer_occupancy);
        delivered.extend(b.recv(4096).unwrap());
        if offset == payload.len() && delivered.len() == payload.len() {
            break;
        }
    }

    assert_eq!(delivered, payload, "reordering never changes delivery order");
    assert!(
        peak_occupancy < window as usize,
        "reorder buffer occupancy ({}) stays below the window ({})",
        peak_occupancy,
        window
    );
}

#[test]
fn test_zero_window_stall_and_recovery() {
    // Spec §8 scenario 5: a zero advertised window pauses new transmissions
    // (but not retransmission of what's already in flight); a subsequent ack
    // raising the window lets transmission resume.
    let config = TransportConfig {
        window: 4,
        mss: 4,
        ..Default::default()
    };
    let peer: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40099);
    let mut a = Transport::with_config(config).unwrap();
    a.connect(peer).unwrap();

    a.send(b"aaaabbbb").unwrap(); // two never-sent segments, seq 0 and 1

    let zero_window = wire::encode(&Packet::Ack {
        channel: ChannelType::Reliable,
        seq_no: 0,
        timestamp: 0,
        ack_no: 0,
        recv_window: 0,
        echo_timestamp: 0,
    });
    a.inject(&zero_window, 0);

    a.tick(0).unwrap();
    assert!(
        a.collect_outgoing().is_empty(),
        "a zero advertised window pauses even never-sent segments"
    );

    let reopened = wire::encode(&Packet::Ack {
        channel: ChannelType::Reliable,
        seq_no: 0,
        timestamp: 10,
        ack_no: 0,
        recv_window: 4,
        echo_timestamp: 10,
    });
    a.inject(&reopened, 10);

    a.tick(10).unwrap();
    assert_eq!(
        a.collect_outgoing().len(),
        2,
        "transmission resumes once a subsequent ack raises the window"
    );
}

#[test]
fn test_single_segment_timeout_retransmits_once_and_excludes_rtt_sample() {
    // Spec §8 scenario 6: deliver everything but one segment; its deadline
    // expires, it is retransmitted exactly once and acknowledged, and that
    // retransmission contributes no RTT sample (Karn's algorithm).
    let config = TransportConfig {
        window: 8,
        mss: 1024,
        ..Default::default()
    };
    let (a_addr, b_addr) = sim_addrs();
    let mut a = Transport::with_config(config.clone()).unwrap();
    let mut b = Transport::with_config(config).unwrap();
    a.connect(b_addr).unwrap();
    b.connect(a_addr).unwrap();

    a.send(b"lone segment").unwrap();

    let sim_config = SimulationConfig {
        latency_ms: 10,
        ..Default::default()
    };
    let mut sim = NetworkSimulator::with_seed(sim_config, 7);
    let mut now_ms = 0u64;
    let mut dropped_once = false;

    for _ in 0..5000 {
        a.tick(now_ms).unwrap();
        b.tick(now_ms).unwrap();

        for datagram in a.collect_outgoing() {
            if !dropped_once {
                dropped_once = true; // the segment's first transmission is the one loss this scenario needs
                continue;
            }
            sim.send(&datagram, a_addr, b_addr);
        }
        for datagram in b.collect_outgoing() {
            sim.send(&datagram, b_addr, a_addr);
        }

        now_ms += 5;
        for delivered in sim.advance(5) {
            if delivered.to == a_addr {
                a.inject(&delivered.data, now_ms);
            } else if delivered.to == b_addr {
                b.inject(&delivered.data, now_ms);
            }
        }

        if a.stats().reliable.segments_in_flight == 0 {
            break;
        }
    }

    assert_eq!(b.recv(4096).unwrap(), b"lone segment");
    let stats = a.stats();
    assert_eq!(stats.reliable.total_retransmitted, 1, "the dropped segment is retransmitted exactly once");
    assert_eq!(stats.reliable.srtt_ms, 0.0, "Karn's algorithm excludes the retransmitted segment's RTT");
}
