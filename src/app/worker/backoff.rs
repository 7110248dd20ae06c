//! Retry delay calculation

use std::time::Duration;

/// Backoff calculation utilities
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Exponential retry delay with jitter
    ///
    /// `attempt` is the 1-based number of the attempt that just failed; the
    /// delay doubles per attempt from `base_delay` up to `max_delay`, then
    /// gets up to `jitter_percentage` added or removed.
    pub fn retry_delay(
        attempt: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_percentage: f64,
    ) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base_millis = base_delay.as_millis() as u64;
        let exponential = base_millis.saturating_mul(1u64 << exponent);
        let capped = exponential.min(max_delay.as_millis() as u64);

        // Add jitter to prevent thundering herd
        let jitter_range = (capped as f64 * jitter_percentage) as u64;
        let jittered = if jitter_range > 0 {
            let offset = fastrand::u64(0..=jitter_range * 2);
            (capped + offset).saturating_sub(jitter_range)
        } else {
            capped
        };

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_without_jitter() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);

        assert_eq!(BackoffCalculator::retry_delay(1, base, max, 0.0), Duration::from_millis(100));
        assert_eq!(BackoffCalculator::retry_delay(2, base, max, 0.0), Duration::from_millis(200));
        assert_eq!(BackoffCalculator::retry_delay(3, base, max, 0.0), Duration::from_millis(400));
        assert_eq!(BackoffCalculator::retry_delay(10, base, max, 0.0), max);
    }

    #[test]
    fn test_retry_delay_jitter_bounds() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_secs(10);
        for _ in 0..100 {
            let delay = BackoffCalculator::retry_delay(1, base, max, 0.1);
            assert!(delay >= Duration::from_millis(900));
            assert!(delay <= Duration::from_millis(1100));
        }
    }
}
