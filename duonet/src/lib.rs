//! # duonet
//!
//! A dual-channel UDP transport: a reliable, in-order selective-repeat
//! stream with selective acknowledgements, and an unreliable fire-and-forget
//! channel, multiplexed over a single socket.
//!
//! duonet operates at the transport level using a synchronous, polling
//! model: the caller drives time and CPU by invoking [`Transport::poll`].
//!
//! ## Features
//!
//! - **Selective-repeat ARQ** with cumulative ACK and SACK feedback
//! - **Jacobson/Karels RTO estimation** with Karn's algorithm and
//!   exponential backoff
//! - **Fixed sender window** — no congestion control, no handshake
//! - **Unreliable channel** sharing the same socket, with no retained state
//! - **Deterministic network simulator** for reproducible loss/jitter tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use duonet::prelude::*;
//!
//! let mut sender = Transport::new(32, 1.0, false).unwrap();
//! sender.bind("127.0.0.1:0".parse().unwrap()).unwrap();
//! sender.connect("127.0.0.1:9000".parse().unwrap()).unwrap();
//! sender.send(b"hello").unwrap();
//! sender.poll(10).unwrap();
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod stats;
pub mod transport;
pub mod unreliable;
pub mod util;
pub mod wire;

pub use config::TransportConfig;
pub use error::{ConfigError, SocketError, TransportError};
pub use simulator::{NetworkSimulator, SimulationConfig};
pub use socket::UdpSocket;
pub use stats::{ReliabilityStats, SocketStats, TransportStats};
pub use transport::Transport;
pub use util::{sequence_diff, sequence_greater_than, sequence_less_than};
pub use wire::{ChannelType, DecodeError, Packet, PacketType, SackBlock};

/// Prelude: import everything commonly needed to drive a transport instance.
pub mod prelude {
    pub use crate::{Transport, TransportConfig, TransportError, TransportStats};
    pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
}
