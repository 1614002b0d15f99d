//! Plain configuration structs. No file or environment parsing lives here;
//! a loader external to this crate is responsible for producing these.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How often the Market Registry re-lists markets from REST to catch
    /// additions/removals the lifecycle feed missed.
    pub reconcile_interval: Duration,
    /// Bound on the `SubscribeChanges` fan-out channel; full channels drop
    /// the oldest pending change.
    pub changes_channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(300),
            changes_channel_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub ws_url: String,
    /// Markets assigned to a single orderbook-pool connection before a new
    /// connection is opened for the overflow.
    pub markets_per_connection: usize,
    /// Number of orderbook-pool connections to maintain.
    pub orderbook_count: usize,
    /// Number of global-pool connections to maintain, each subscribed to
    /// trade/ticker/lifecycle for the full market universe.
    pub global_count: usize,
    /// How long to wait for any frame (including the exchange's heartbeat
    /// ping) before treating the connection as stale and reconnecting.
    pub ping_timeout: Duration,
    /// How long to wait for a subscribe/unsubscribe acknowledgment before
    /// treating the command as failed.
    pub response_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string(),
            markets_per_connection: 250,
            orderbook_count: 144,
            global_count: 6,
            ping_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub max_batch_size: usize,
    pub max_batch_delay: Duration,
    pub input_channel_capacity: usize,
    /// Transient write failures are retried this many times, with backoff,
    /// before the batch is dropped and counted.
    pub max_retries: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_batch_delay: Duration::from_secs(1),
            input_channel_capacity: 10_000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Floored at one minute regardless of configured value.
    pub poll_interval: Duration,
    /// Concurrent in-flight orderbook requests; expected in the 10-100
    /// range.
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl PollerConfig {
    const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(Self::MIN_POLL_INTERVAL)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15 * 60),
            max_concurrent_requests: 20,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GathererConfig {
    pub registry: RegistryConfig,
    pub connection: ConnectionConfig,
    pub writer: WriterConfig,
    pub poller: PollerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_is_floored() {
        let config = PollerConfig {
            poll_interval: Duration::from_secs(5),
            ..PollerConfig::default()
        };
        assert_eq!(config.effective_poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_poll_interval_above_floor_is_unchanged() {
        let config = PollerConfig::default();
        assert_eq!(config.effective_poll_interval(), Duration::from_secs(15 * 60));
    }
}
