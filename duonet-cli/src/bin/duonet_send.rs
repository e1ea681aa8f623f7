//! Sender CLI driver: pumps a fixed number of synthetic packets at a given
//! rate into a duonet transport connected to a remote receiver.
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::Parser;
use duonet::prelude::*;
use duonet::TransportConfig;

#[derive(Parser, Debug)]
#[command(name = "duonet-send", about = "Send synthetic traffic over duonet")]
struct Args {
    /// Destination host:port.
    #[arg(long)]
    dst: SocketAddr,
    /// Number of packets to send.
    #[arg(long, default_value_t = 300)]
    num_packets: u32,
    /// Send rate, in packets per second.
    #[arg(long, default_value_t = 50.0)]
    rate: f64,
    /// Probability a given segment is routed to the reliable channel.
    #[arg(long, default_value_t = 1.0)]
    prob_reliable: f64,
    /// Enable SACK feedback on the reliable channel.
    #[arg(long, default_value_t = true)]
    sack: bool,
    /// Verbose per-packet logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = TransportConfig {
        prob_reliable: args.prob_reliable,
        sack_enabled: args.sack,
        verbose: args.verbose,
        ..Default::default()
    };

    let mut transport = match Transport::with_config(config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = transport.bind("0.0.0.0:0".parse().unwrap()) {
        eprintln!("bind failed: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = transport.connect(args.dst) {
        eprintln!("connect failed: {}", e);
        std::process::exit(1);
    }

    let interval = Duration::from_secs_f64(1.0 / args.rate.max(0.001));
    let mut sent = 0u32;
    let start = Instant::now();

    while sent < args.num_packets {
        let tick_start = Instant::now();
        let payload = sent.to_be_bytes();
        match transport.send(&payload) {
            Ok(_) => {
                sent += 1;
                log::debug!("sent packet {} at {:?}", sent, start.elapsed());
            }
            Err(e) => {
                log::warn!("send failed: {}", e);
            }
        }
        if let Err(e) = transport.poll(1) {
            eprintln!("poll failed: {}", e);
            std::process::exit(1);
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    if let Err(e) = transport.drain(Duration::from_secs(10)) {
        eprintln!("drain did not complete: {}", e);
        std::process::exit(1);
    }

    let stats = transport.stats();
    println!(
        "sent {} packets, {} retransmitted, srtt={:.1}ms",
        sent, stats.reliable.total_retransmitted, stats.reliable.srtt_ms
    );
}
