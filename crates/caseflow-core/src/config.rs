//! Configuration for orchestration, timeouts, resource ceilings, and retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the investigation orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Global ceiling on simultaneously active investigations.
    pub max_concurrent_investigations: usize,
    /// Default deadline for investigations started without an explicit
    /// timeout.
    #[serde(with = "duration_millis")]
    pub default_timeout: Duration,
    /// Fixed per-step duration used for ETA estimates.
    #[serde(with = "duration_millis")]
    pub step_duration_estimate: Duration,
    /// ETA offset reported when no steps remain but the investigation is
    /// not yet finalized.
    #[serde(with = "duration_millis")]
    pub finalization_estimate: Duration,
    /// Interval between queue-processing passes.
    #[serde(with = "duration_millis")]
    pub queue_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_investigations: 10,
            default_timeout: Duration::from_secs(30 * 60),
            step_duration_estimate: Duration::from_secs(30),
            finalization_estimate: Duration::from_secs(10),
            queue_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Configuration for the timeout and resource manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Interval between deadline sweeps.
    #[serde(with = "duration_millis")]
    pub sweep_interval: Duration,
    /// The resource sweep runs every N deadline sweeps.
    pub resource_sweep_multiplier: u32,
    /// Extra window after the deadline before forced termination.
    #[serde(with = "duration_millis")]
    pub grace_period: Duration,
    /// Fraction of total duration at which the warning fires.
    pub warning_fraction: f64,
    /// Extension granted once when a resource ceiling is violated.
    #[serde(with = "duration_millis")]
    pub resource_violation_extension: Duration,
    /// Investigations with no recorded activity within this window are
    /// considered stale.
    #[serde(with = "duration_millis")]
    pub inactivity_window: Duration,
    /// Per-investigation memory growth beyond this triggers forced
    /// termination.
    pub memory_leak_threshold_bytes: u64,
    /// Ceiling on the sum of tracked memory snapshots.
    pub max_tracked_memory_bytes: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            resource_sweep_multiplier: 6,
            grace_period: Duration::from_secs(60),
            warning_fraction: 0.8,
            resource_violation_extension: Duration::from_secs(30),
            inactivity_window: Duration::from_secs(10 * 60),
            memory_leak_threshold_bytes: 256 * 1024 * 1024,
            max_tracked_memory_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Per-investigation resource ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_bytes: u64,
    pub max_api_calls: u32,
    pub max_evidence_items: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 512 * 1024 * 1024,
            max_api_calls: 500,
            max_evidence_items: 1000,
        }
    }
}

/// Configuration for retry behavior in the resilient executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts beyond the first try.
    pub max_retries: u32,
    /// Base delay before the first retry.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Cap on any single delay.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Randomize each delay by +/-20% when enabled.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries; fail on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculates the delay before retry attempt `attempt` (0-indexed),
    /// capped at `max_delay` and jittered by +/-20% when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64
            * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let final_delay = if self.jitter {
            capped * (0.8 + 0.4 * rand_fraction())
        } else {
            capped
        };
        Duration::from_millis(final_delay as u64)
    }
}

/// Pseudo-random fraction in [0, 1) derived from the clock. Good enough for
/// jitter; not for anything security-relevant.
fn rand_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Configuration for the metrics collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Interval between buffered flushes into the aggregates.
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Buffered events are flushed early once this many accumulate.
    pub buffer_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            buffer_size: 256,
        }
    }
}

/// Serde helper storing `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_concurrent_investigations, 10);
        assert_eq!(config.default_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_retry_delay_progression() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_delay_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(250),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(250));
    }

    #[test]
    fn test_retry_delay_jitter_bounds() {
        let config = RetryConfig::default();
        for attempt in 0..4 {
            let base = 100.0 * 2.0_f64.powi(attempt) as f64;
            let expected = base.min(5000.0);
            let delay = config.delay_for_attempt(attempt as u32).as_millis() as f64;
            assert!(delay >= expected * 0.8 - 1.0, "delay {delay} below jitter floor");
            assert!(delay <= expected * 1.2 + 1.0, "delay {delay} above jitter ceiling");
        }
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = TimeoutConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TimeoutConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grace_period, config.grace_period);
        assert_eq!(back.resource_sweep_multiplier, 6);
    }
}
