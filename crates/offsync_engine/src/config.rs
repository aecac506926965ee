//! Configuration for the queue processor and heartbeat monitor.

use rand::Rng;
use std::time::Duration;

/// Configuration for the queue processor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Record partitions attempted concurrently per tick.
    pub concurrency: usize,
    /// How often the processor wakes when nothing else does.
    pub tick_interval: Duration,
    /// Bound on each remote apply call.
    pub apply_timeout: Duration,
    /// Backoff behavior for transient failures.
    pub retry: RetryConfig,
    /// Heartbeat monitoring.
    pub heartbeat: HeartbeatConfig,
}

impl EngineConfig {
    /// Creates a configuration with default tunables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            concurrency: 4,
            tick_interval: Duration::from_secs(5),
            apply_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Sets the worker-pool bound.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the idle wake interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the remote apply timeout.
    #[must_use]
    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the heartbeat configuration.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff behavior for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
    /// Whether to spread delays with jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Delay before the next attempt for an operation with
    /// `retry_count` failed attempts, in milliseconds.
    ///
    /// Delays double per attempt with up to 20% jitter, capped at
    /// `max_delay` after jitter so the schedule never decreases.
    #[must_use]
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        if retry_count == 0 {
            return 0;
        }
        let exponent = retry_count.saturating_sub(1).min(32);
        let base = self.initial_delay.as_millis() as f64 * 2f64.powi(exponent as i32);
        let jitter = if self.add_jitter {
            rand::thread_rng().gen_range(0.0..0.2)
        } else {
            0.0
        };
        let delayed = base * (1.0 + jitter);
        delayed.min(self.max_delay.as_millis() as f64) as u64
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            add_jitter: true,
        }
    }
}

/// Heartbeat timing for the connection registry.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often the monitor sweeps.
    pub sweep_interval: Duration,
    /// Silence before a connected session drops to reconnecting.
    pub timeout: Duration,
    /// Further silence before a reconnecting session is disconnected.
    pub grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            grace: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(60_000),
            add_jitter: false,
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = no_jitter();
        assert_eq!(retry.backoff_ms(1), 1_000);
        assert_eq!(retry.backoff_ms(2), 2_000);
        assert_eq!(retry.backoff_ms(3), 4_000);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let retry = no_jitter();
        assert_eq!(retry.backoff_ms(30), 60_000);
    }

    #[test]
    fn jitter_stays_under_twenty_percent() {
        let retry = RetryConfig {
            add_jitter: true,
            ..no_jitter()
        };
        for _ in 0..100 {
            let delay = retry.backoff_ms(2);
            assert!((2_000..2_400).contains(&delay));
        }
    }

    #[test]
    fn schedule_is_monotone_under_jitter() {
        let retry = RetryConfig {
            add_jitter: true,
            ..no_jitter()
        };
        for _ in 0..100 {
            let mut previous = 0;
            for attempt in 1..=10 {
                let delay = retry.backoff_ms(attempt);
                assert!(delay >= previous);
                previous = delay;
            }
        }
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_concurrency(8)
            .with_tick_interval(Duration::from_secs(1))
            .with_apply_timeout(Duration::from_secs(5));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.apply_timeout, Duration::from_secs(5));
    }
}
