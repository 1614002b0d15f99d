//! Exponential backoff with jitter for WebSocket reconnection.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self { base, max, multiplier }
    }

    /// Delay before reconnect attempt `attempt` (0-indexed: the first retry
    /// after the initial connection uses `attempt = 0`).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let scaled = self.base.mul_f64(factor).min(self.max);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        scaled.mul_f64(jitter).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_delay_is_capped_at_max() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(5), 2.0);
        for attempt in 0..20 {
            let delay = policy.next_delay(attempt);
            assert!(delay <= Duration::from_secs(5), "attempt {attempt} exceeded max: {delay:?}");
        }
    }

    #[test]
    fn test_next_delay_grows_with_attempt_on_average() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(60), 2.0);
        let early = policy.next_delay(0);
        let later = policy.next_delay(5);
        // jitter makes a single sample noisy, but the unjittered midpoints
        // differ by 32x so this holds regardless of jitter draw.
        assert!(later > early);
    }
}
