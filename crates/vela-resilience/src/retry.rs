//! Retry backoff schedule: exponential, capped, half-jittered.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for transient-failure retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt`
    /// (1-based). Half-jittered: a uniform draw from
    /// `[exp/2, exp]` where `exp = min(base * multiplier^(attempt-1), cap)`,
    /// so synchronized clients spread out instead of stampeding.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let half = capped / 2.0;
        let jittered = half + rand::rng().random_range(0.0..=half);
        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        // Bounds hold for every draw of the jitter.
        for _ in 0..50 {
            let first = policy.backoff(1);
            assert!(first >= Duration::from_millis(500) && first <= Duration::from_secs(1));

            let second = policy.backoff(2);
            assert!(second >= Duration::from_secs(1) && second <= Duration::from_secs(2));

            // 1s * 2^9 far exceeds the 10s cap.
            let late = policy.backoff(10);
            assert!(late >= Duration::from_secs(5) && late <= Duration::from_secs(10));
        }
    }
}
