//! RTO estimation: Jacobson/Karels smoothing, Karn's algorithm, and
//! exponential backoff on retransmit. Generalizes a single endpoint-wide
//! RTO into an estimate that per-segment deadlines are derived from.
use std::time::Duration;

/// Smoothing gain applied to the SRTT estimate on every sample (`1/8`).
const RTT_ALPHA: f64 = 0.125;
/// Smoothing gain applied to the mean deviation estimate on every sample (`1/4`).
const RTT_BETA: f64 = 0.25;
/// Multiplier applied to `rttvar` in the RTO formula.
const RTO_K: f64 = 4.0;

/// Tracks SRTT/RTTVAR and derives the current retransmission timeout.
///
/// Only ACKs for segments that were never retransmitted feed RTT samples
/// (Karn's algorithm): an ACK that might be acknowledging either the
/// original or a retransmitted copy of a segment is an ambiguous RTT
/// sample and is excluded rather than guessed at.
#[derive(Debug, Clone)]
pub struct RtoEstimator {
    srtt: Option<f64>,
    rttvar: f64,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    clock_granularity: Duration,
}

impl RtoEstimator {
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration, clock_granularity: Duration) -> Self {
        Self {
            srtt: None,
            rttvar: 0.0,
            rto: initial_rto,
            min_rto,
            max_rto,
            clock_granularity,
        }
    }

    /// Feeds one unambiguous RTT sample (in milliseconds) into the estimator.
    pub fn on_rtt_sample(&mut self, sample_ms: f64) {
        let granularity_ms = self.clock_granularity.as_secs_f64() * 1000.0;
        match self.srtt {
            None => {
                self.srtt = Some(sample_ms);
                self.rttvar = sample_ms / 2.0;
            }
            Some(srtt) => {
                self.rttvar = (1.0 - RTT_BETA) * self.rttvar + RTT_BETA * (srtt - sample_ms).abs();
                self.srtt = Some((1.0 - RTT_ALPHA) * srtt + RTT_ALPHA * sample_ms);
            }
        }
        let srtt = self.srtt.unwrap();
        let rto_ms = srtt + (RTO_K * self.rttvar).max(granularity_ms);
        self.rto = Duration::from_millis(rto_ms as u64).clamp(self.min_rto, self.max_rto);
    }

    /// Current RTO to arm a fresh segment's retransmit deadline with.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Doubles a prior RTO on retransmission timeout, capped at `max_rto`.
    /// The doubled value is NOT fed back into `self.rto` directly — callers
    /// arm the next deadline with the returned value while the smoothed
    /// estimate is left untouched, matching the Karn backoff rule that an
    /// RTO-triggered retransmit must not corrupt the underlying RTT model.
    pub fn backoff(&self, prior: Duration) -> Duration {
        let doubled = prior.saturating_mul(2);
        doubled.min(self.max_rto)
    }

    pub fn srtt_ms(&self) -> f64 {
        self.srtt.unwrap_or(0.0)
    }

    pub fn rttvar_ms(&self) -> f64 {
        self.rttvar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> RtoEstimator {
        RtoEstimator::new(
            Duration::from_millis(200),
            Duration::from_millis(50),
            Duration::from_secs(10),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_first_sample_sets_srtt_directly() {
        let mut est = estimator();
        est.on_rtt_sample(50.0);
        assert_eq!(est.srtt_ms(), 50.0);
        assert_eq!(est.rttvar_ms(), 25.0);
    }

    #[test]
    fn test_srtt_converges_to_stable_samples() {
        let mut est = estimator();
        for _ in 0..30 {
            est.on_rtt_sample(80.0);
        }
        assert!((est.srtt_ms() - 80.0).abs() < 1.0);
    }

    #[test]
    fn test_rto_grows_with_jitter() {
        let mut est = estimator();
        est.on_rtt_sample(50.0);
        let rto_before = est.rto();
        est.on_rtt_sample(300.0);
        assert!(est.rto() > rto_before);
    }

    #[test]
    fn test_rto_clamped_to_max() {
        let mut est = estimator();
        est.on_rtt_sample(50.0);
        est.on_rtt_sample(100_000.0);
        assert!(est.rto() <= Duration::from_secs(10));
    }

    #[test]
    fn test_rto_clamped_to_min() {
        let mut est = estimator();
        est.on_rtt_sample(0.1);
        assert!(est.rto() >= Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let est = estimator();
        let once = est.backoff(Duration::from_millis(200));
        assert_eq!(once, Duration::from_millis(400));
        let many = est.backoff(Duration::from_secs(20));
        assert_eq!(many, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_does_not_mutate_estimator() {
        let mut est = estimator();
        est.on_rtt_sample(50.0);
        let srtt_before = est.srtt_ms();
        let _ = est.backoff(Duration::from_millis(400));
        assert_eq!(est.srtt_ms(), srtt_before);
    }
}
