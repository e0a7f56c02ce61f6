//! Exponential retry backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Maps a retry count to a wait before the next dispatch.
///
/// `delay(n) = min(base * 2^n + uniform(0, jitter), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    #[must_use]
    pub const fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.jitter_ms),
        )
    }

    /// Same curve without the random component.
    #[must_use]
    pub const fn without_jitter(self) -> Self {
        Self {
            jitter: Duration::ZERO,
            ..self
        }
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max
    }

    /// Deterministic part of the delay, capped at `max`.
    #[must_use]
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay with an explicit jitter sample in `[0, 1]`.
    #[must_use]
    pub fn delay_with_jitter(&self, retry_count: u32, sample: f64) -> Duration {
        let jitter = self.jitter.mul_f64(sample.clamp(0.0, 1.0));
        self.base_delay(retry_count)
            .saturating_add(jitter)
            .min(self.max)
    }

    /// Delay for the given retry count, drawing jitter from `rng`.
    ///
    /// No wait is applied before the first attempt.
    pub fn delay<R: Rng + ?Sized>(&self, retry_count: u32, rng: &mut R) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        if self.jitter.is_zero() {
            return self.base_delay(retry_count);
        }
        self.delay_with_jitter(retry_count, rng.gen::<f64>())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(1_000),
            Duration::from_secs(60),
            Duration::from_millis(1_000),
        )
    }

    #[test]
    fn base_delay_doubles_until_capped() {
        let policy = policy();
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay(5), Duration::from_secs(32));
        assert_eq!(policy.base_delay(6), Duration::from_secs(60));
        assert_eq!(policy.base_delay(40), Duration::from_secs(60));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn non_jittered_delay_is_monotonic_and_bounded() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for retry in 1..64 {
            let delay = policy.base_delay(retry);
            assert!(delay >= previous, "retry {retry} shrank the delay");
            assert!(delay <= policy.max_delay());
            previous = delay;
        }
    }

    #[test]
    fn jittered_delay_stays_within_window_and_cap() {
        let policy = policy();
        let mut rng = StdRng::seed_from_u64(7);
        for retry in 1..20 {
            let delay = policy.delay(retry, &mut rng);
            assert!(delay >= policy.base_delay(retry));
            assert!(delay <= policy.base_delay(retry) + Duration::from_secs(1));
            assert!(delay <= policy.max_delay());
        }
    }

    #[test]
    fn jitter_sample_is_clamped() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(1, 0.5),
            Duration::from_millis(2_500)
        );
        assert_eq!(policy.delay_with_jitter(1, 3.0), Duration::from_secs(3));
        assert_eq!(policy.delay_with_jitter(1, -1.0), Duration::from_secs(2));
    }

    #[test]
    fn first_attempt_never_waits() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy().delay(0, &mut rng), Duration::ZERO);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let policy = policy();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for retry in 1..8 {
            assert_eq!(policy.delay(retry, &mut a), policy.delay(retry, &mut b));
        }
    }

    #[test]
    fn without_jitter_matches_base_delay() {
        let policy = policy().without_jitter();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(policy.delay(3, &mut rng), policy.base_delay(3));
    }
}
