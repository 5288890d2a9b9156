//! Shared exponential backoff with a cap, used by pollers (per-source
//! failure backoff), the bus sink, and the notifier's retry policy.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Exponential backoff state: `base * 2^(failures - 1)`, capped at `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
        }
    }

    /// Register a failure and return the delay before the next attempt.
    pub fn register_failure(&mut self) -> Duration {
        self.failures += 1;
        self.delay()
    }

    /// Reset after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Current delay given the accumulated failure count, without mutating
    /// state. `min(base * 2^(k-1), cap)`, k clamped so the exponent never
    /// overflows a `u32` shift.
    pub fn delay(&self) -> Duration {
        if self.failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.failures - 1).min(6);
        let multiplier = 1u64 << exponent;
        let scaled = self.base.saturating_mul(multiplier as u32);
        scaled.min(self.cap)
    }

    /// `delay()` with up to ±25% jitter, for retry paths that need it
    /// (bus sink, notifier publish).
    pub fn jittered_delay(&self) -> Duration {
        let base = self.delay();
        if base.is_zero() {
            return base;
        }
        let jitter_frac = rand::rng().random_range(-0.25..=0.25);
        let millis = base.as_millis() as f64 * (1.0 + jitter_frac);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// A per-source backoff record tracking when the next attempt is allowed.
#[derive(Debug, Clone)]
pub struct SourceBackoff {
    backoff: Backoff,
    next_attempt_utc: Option<DateTime<Utc>>,
}

impl SourceBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            backoff: Backoff::new(base, cap),
            next_attempt_utc: None,
        }
    }

    /// True if the source is still within its backoff window.
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_attempt_utc, Some(next) if now < next)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.next_attempt_utc
            .map(|next| next - now)
            .filter(|d| d.num_milliseconds() > 0)
    }

    pub fn register_failure(&mut self, now: DateTime<Utc>) {
        let delay = self.backoff.register_failure();
        self.next_attempt_utc = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.next_attempt_utc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_follows_base_times_two_pow_k_minus_one() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        assert_eq!(backoff.register_failure(), Duration::from_secs(5));
        assert_eq!(backoff.register_failure(), Duration::from_secs(10));
        assert_eq!(backoff.register_failure(), Duration::from_secs(20));
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        for _ in 0..10 {
            backoff.register_failure();
        }
        assert_eq!(backoff.delay(), Duration::from_secs(30));
    }

    #[test]
    fn reset_clears_failure_count() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        backoff.register_failure();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.delay(), Duration::ZERO);
    }

    #[test]
    fn source_backoff_three_failures_waits_twenty_seconds() {
        let mut source = SourceBackoff::new(Duration::from_secs(5), Duration::from_secs(300));
        let t0 = Utc::now();
        source.register_failure(t0);
        source.register_failure(t0 + chrono::Duration::seconds(5));
        source.register_failure(t0 + chrono::Duration::seconds(10));
        let last_failure = t0 + chrono::Duration::seconds(10);
        assert!(source.is_backing_off(last_failure));
        let remaining = source.remaining(last_failure).unwrap();
        assert_eq!(remaining.num_seconds(), 20);
    }
}
