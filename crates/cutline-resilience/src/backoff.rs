//! Exponential backoff and opt-in jitter
//!
//! The retry loop uses pure exponential delays. Jitter is a separate helper
//! that only applies when a config asks for it.

use rand::Rng;
use std::time::Duration;

/// `base * multiplier^attempt`.
///
/// Computed in nanoseconds, so integral multipliers give exact results.
/// Saturates at `u64::MAX` nanoseconds.
pub fn exponential_delay(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let nanos = base.as_nanos() as f64 * multiplier.powi(exponent);

    // `as` saturates for out-of-range floats and maps NaN to zero
    Duration::from_nanos(nanos.round() as u64)
}

/// Adds a random fraction of `delay`, up to `delay * jitter_factor`.
///
/// The result never falls below `delay`. A non-positive factor returns
/// `delay` unchanged.
pub fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || !jitter_factor.is_finite() {
        return delay;
    }

    let mut rng = rand::thread_rng();
    let fraction: f64 = rng.gen::<f64>() * jitter_factor;
    let extra = (delay.as_nanos() as f64 * fraction) as u64;

    delay.saturating_add(Duration::from_nanos(extra))
}

/// Iterator over the un-jittered delays of a retry schedule
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    retries: u32,
    attempt: u32,
}

impl Backoff {
    /// Create a schedule of `retries` delays
    pub fn new(base: Duration, multiplier: f64, retries: u32) -> Self {
        Self {
            base,
            multiplier,
            retries,
            attempt: 0,
        }
    }

    /// Get the current attempt number (0-indexed)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Get remaining delays
    pub fn remaining(&self) -> u32 {
        self.retries.saturating_sub(self.attempt)
    }

    /// Sum of every remaining delay; the worst-case time a call spends sleeping
    pub fn total(&self) -> Duration {
        self.clone()
            .fold(Duration::ZERO, |acc, delay| acc.saturating_add(delay))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.attempt >= self.retries {
            return None;
        }

        let delay = exponential_delay(self.base, self.multiplier, self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Backoff {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(exponential_delay(base, 2.0, 0), Duration::from_secs(1));
        assert_eq!(exponential_delay(base, 2.0, 1), Duration::from_secs(2));
        assert_eq!(exponential_delay(base, 2.0, 3), Duration::from_secs(8));
        assert_eq!(exponential_delay(base, 1.5, 1), Duration::from_millis(1500));
    }

    #[test]
    fn test_fractional_multiplier_shrinks() {
        let base = Duration::from_millis(1000);
        assert_eq!(exponential_delay(base, 0.5, 2), Duration::from_millis(250));
    }

    #[test]
    fn test_delay_saturates() {
        let delay = exponential_delay(Duration::from_secs(1), 10.0, 40);
        assert_eq!(delay, Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_secs(1);
        for _ in 0..100 {
            let jittered = add_jitter(delay, 0.1);
            assert!(jittered >= delay);
            assert!(jittered <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let delay = Duration::from_millis(250);
        assert_eq!(add_jitter(delay, 0.0), delay);
        assert_eq!(add_jitter(delay, -1.0), delay);
    }

    #[test]
    fn test_backoff_iteration() {
        let backoff = Backoff::new(Duration::from_millis(100), 2.0, 3);
        assert_eq!(backoff.len(), 3);

        let delays: Vec<_> = backoff.collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_backoff_total() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 2.0, 2);
        assert_eq!(backoff.total(), Duration::from_millis(300));

        backoff.next();
        assert_eq!(backoff.attempt(), 1);
        assert_eq!(backoff.remaining(), 1);
        assert_eq!(backoff.total(), Duration::from_millis(200));
    }

    #[test]
    fn test_empty_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 2.0, 0);
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.total(), Duration::ZERO);
    }
}
