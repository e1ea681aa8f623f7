//! Receiver CLI driver: listens for traffic on the reliable channel and
//! writes the delivered byte stream to a file.
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::Parser;
use duonet::prelude::*;
use duonet::TransportConfig;

#[derive(Parser, Debug)]
#[command(name = "duonet-recv", about = "Receive synthetic traffic over duonet")]
struct Args {
    /// Local host:port to listen on.
    #[arg(long)]
    listen: SocketAddr,
    /// Peer host:port feedback (ACK/SACK) is sent back to. The transport has
    /// no handshake, so both ends must agree on each other's address out of
    /// band.
    #[arg(long)]
    peer: SocketAddr,
    /// Output path for the delivered byte stream.
    #[arg(long)]
    out: String,
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

    if let Err(e) = transport.bind(args.listen) {
        eprintln!("bind failed: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = transport.connect(args.peer) {
        eprintln!("connect failed: {}", e);
        std::process::exit(1);
    }

    let mut out = match File::create(&args.out) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("could not create output file {}: {}", args.out, e);
            std::process::exit(1);
        }
    };

    let idle_timeout = Duration::from_secs(5);
    let mut last_activity = Instant::now();

    loop {
        if let Err(e) = transport.poll(50) {
            eprintln!("poll failed: {}", e);
            std::process::exit(1);
        }

        let bytes = match transport.recv(65536) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("recv failed: {}", e);
                std::process::exit(1);
            }
        };
        if !bytes.is_empty() {
            last_activity = Instant::now();
            if let Err(e) = out.write_all(&bytes) {
                eprintln!("write failed: {}", e);
                std::process::exit(1);
            }
            log::debug!("wrote {} bytes", bytes.len());
        }

        while let Ok(Some(payload)) = transport.recv_unreliable() {
            last_activity = Instant::now();
            log::debug!("dropped {} unreliable bytes (no sink configured)", payload.len());
        }

        if last_activity.elapsed() > idle_timeout {
            break;
        }
    }

    let stats = transport.stats();
    println!(
        "received {} malformed datagrams, {} unreliable packets",
        stats.malformed_dropped, stats.unreliable_received
    );
}
