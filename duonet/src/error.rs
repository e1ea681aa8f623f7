//! Error hierarchy for the transport: one small enum per subsystem, each
//! implementing `Display` and `std::error::Error` by hand, folded into a
//! single top-level error via `From` impls.
use std::fmt;

/// Errors surfaced by socket bind/send/recv.
#[derive(Debug)]
pub enum SocketError {
    Io(std::io::Error),
    InvalidAddress,
    WouldBlock,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::Io(e) => write!(f, "IO error: {}", e),
            SocketError::InvalidAddress => write!(f, "invalid address"),
            SocketError::WouldBlock => write!(f, "operation would block"),
        }
    }
}

impl std::error::Error for SocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SocketError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SocketError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            // A read-timeout expiry surfaces as `WouldBlock` on Linux and
            // `TimedOut` on some other platforms; both mean "nothing arrived
            // in time" to a caller of a bounded `recv_from`.
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => SocketError::WouldBlock,
            _ => SocketError::Io(err),
        }
    }
}

/// Errors from validating a [`crate::config::TransportConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    WindowTooLarge { window: u32, max: u32 },
    WindowZero,
    ProbabilityOutOfRange(f64),
    MssZero,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WindowTooLarge { window, max } => {
                write!(f, "window {} must be < {}", window, max)
            }
            ConfigError::WindowZero => write!(f, "window must be at least 1"),
            ConfigError::ProbabilityOutOfRange(p) => {
                write!(f, "prob_reliable {} must lie in [0, 1]", p)
            }
            ConfigError::MssZero => write!(f, "mss must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Unified error type surfaced by the transport facade (`NetError`'s counterpart).
///
/// Only state-violation, invalid-argument, io, and timeout kinds are ever
/// returned to a caller — malformed-packet and duplicate/out-of-window
/// conditions are absorbed and counted, never surfaced (see the error
/// handling design: all wire-level pathology is silent-drop, counted).
#[derive(Debug)]
pub enum TransportError {
    Socket(SocketError),
    Config(ConfigError),
    NotConnected,
    AlreadyConnected,
    AlreadyBound,
    Closed,
    DrainTimeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Socket(e) => write!(f, "socket error: {}", e),
            TransportError::Config(e) => write!(f, "invalid configuration: {}", e),
            TransportError::NotConnected => write!(f, "transport is not connected"),
            TransportError::AlreadyConnected => write!(f, "transport is already connected"),
            TransportError::AlreadyBound => write!(f, "transport is already bound"),
            TransportError::Closed => write!(f, "transport is closed"),
            TransportError::DrainTimeout => write!(f, "drain exceeded its deadline"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Socket(e) => Some(e),
            TransportError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SocketError> for TransportError {
    fn from(err: SocketError) -> Self {
        TransportError::Socket(err)
    }
}

impl From<ConfigError> for TransportError {
    fn from(err: ConfigError) -> Self {
        TransportError::Config(err)
    }
}
