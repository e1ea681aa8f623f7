//! Transport configuration: a plain struct with a `Default` impl and a
//! `validate()` that returns a `ConfigError`, rather than validating
//! scattered across constructors.
use std::time::Duration;

use crate::error::ConfigError;
use crate::util::MAX_WINDOW;

/// Default Maximum Segment Size: the largest payload carried in one DATA packet.
pub const DEFAULT_MSS: usize = 1024;

/// Maximum number of SACK blocks carried in one feedback packet.
pub const DEFAULT_SACK_MAX: usize = 4;

/// Slice length used by `drain`'s internal poll loop.
pub const DEFAULT_DRAIN_POLL_SLICE: Duration = Duration::from_millis(50);

/// Configuration for a [`crate::transport::Transport`] instance.
///
/// Both endpoints of a flow must agree on `window`, `mss`, and `sack_enabled`:
/// the protocol has no handshake to negotiate them (see Non-goals).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Sender in-flight window and receiver reorder-buffer capacity, in segments.
    pub window: u32,
    /// Probability that a given `send()` segmentation unit is routed to the
    /// reliable channel rather than the unreliable one.
    pub prob_reliable: f64,
    /// Maximum payload bytes per DATA segment.
    pub mss: usize,
    /// Whether the receiver emits SACK feedback (vs. cumulative ACK only).
    pub sack_enabled: bool,
    /// Maximum number of SACK blocks per feedback packet.
    pub sack_max_blocks: usize,
    /// Minimum RTO the clock estimator will report.
    pub min_rto: Duration,
    /// Maximum RTO the clock estimator will report (also the backoff cap).
    pub max_rto: Duration,
    /// Initial RTO used before any RTT sample has been taken.
    pub initial_rto: Duration,
    /// Clock granularity `G` used in the first-sample RTO formula.
    pub clock_granularity: Duration,
    /// Poll slice used internally by `drain`.
    pub drain_poll_slice: Duration,
    /// Emit verbose per-packet logging at `log::debug!` level.
    pub verbose: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            window: 32,
            prob_reliable: 1.0,
            mss: DEFAULT_MSS,
            sack_enabled: true,
            sack_max_blocks: DEFAULT_SACK_MAX,
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            initial_rto: Duration::from_millis(200),
            clock_granularity: Duration::from_millis(1),
            drain_poll_slice: DEFAULT_DRAIN_POLL_SLICE,
            verbose: false,
        }
    }
}

impl TransportConfig {
    pub fn new(window: u32, prob_reliable: f64, verbose: bool) -> Result<Self, ConfigError> {
        let config = Self {
            window,
            prob_reliable,
            verbose,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::WindowZero);
        }
        if self.window >= MAX_WINDOW {
            return Err(ConfigError::WindowTooLarge {
                window: self.window,
                max: MAX_WINDOW,
            });
        }
        if !(0.0..=1.0).contains(&self.prob_reliable) {
            return Err(ConfigError::ProbabilityOutOfRange(self.prob_reliable));
        }
        if self.mss == 0 {
            return Err(ConfigError::MssZero);
        }
        Ok(())
    }
}
