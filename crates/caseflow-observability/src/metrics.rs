//! Metrics collection for Caseflow.
//!
//! In-memory collector with buffered writes. Events accumulate in a
//! buffer and are folded into the aggregates once the buffer fills or
//! the flush interval elapses. `snapshot` always flushes first so the
//! summary reflects everything recorded so far.

use caseflow_core::MetricsConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A single buffered metric event.
#[derive(Debug, Clone)]
enum MetricEvent {
    Counter { name: String, by: u64 },
    Gauge { name: String, value: f64 },
    Duration { name: String, ms: u64 },
}

/// Aggregated duration statistics for one metric name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationStats {
    fn record(&mut self, ms: u64) {
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.count += 1;
        self.total_ms += ms;
    }

    /// Mean duration in milliseconds, 0 when nothing was recorded.
    pub fn avg_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ms / self.count
        }
    }
}

/// Point-in-time view of all aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub durations: HashMap<String, DurationStats>,
    pub generated_at: DateTime<Utc>,
}

struct CollectorInner {
    buffer: Vec<MetricEvent>,
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    durations: HashMap<String, DurationStats>,
    last_flush: Instant,
}

/// Metrics collector for the investigation pipeline.
pub struct MetricsCollector {
    config: MetricsConfig,
    inner: Arc<RwLock<CollectorInner>>,
}

impl MetricsCollector {
    /// Creates a collector with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(CollectorInner {
                buffer: Vec::new(),
                counters: HashMap::new(),
                gauges: HashMap::new(),
                durations: HashMap::new(),
                last_flush: Instant::now(),
            })),
        }
    }

    /// Increments a counter by one.
    pub async fn increment_counter(&self, name: &str) {
        self.increment_counter_by(name, 1).await;
    }

    /// Increments a counter by an arbitrary amount.
    pub async fn increment_counter_by(&self, name: &str, by: u64) {
        self.push(MetricEvent::Counter {
            name: name.to_string(),
            by,
        })
        .await;
    }

    /// Sets a gauge to an absolute value.
    pub async fn set_gauge(&self, name: &str, value: f64) {
        self.push(MetricEvent::Gauge {
            name: name.to_string(),
            value,
        })
        .await;
    }

    /// Records a duration observation in milliseconds.
    pub async fn record_duration_ms(&self, name: &str, ms: u64) {
        self.push(MetricEvent::Duration {
            name: name.to_string(),
            ms,
        })
        .await;
    }

    async fn push(&self, event: MetricEvent) {
        let mut inner = self.inner.write().await;
        inner.buffer.push(event);

        let buffer_full = inner.buffer.len() >= self.config.buffer_size;
        let interval_elapsed = inner.last_flush.elapsed() >= self.config.flush_interval;
        if buffer_full || interval_elapsed {
            Self::flush_locked(&mut inner);
        }
    }

    fn flush_locked(inner: &mut CollectorInner) {
        let events = std::mem::take(&mut inner.buffer);
        for event in events {
            match event {
                MetricEvent::Counter { name, by } => {
                    *inner.counters.entry(name).or_insert(0) += by;
                }
                MetricEvent::Gauge { name, value } => {
                    inner.gauges.insert(name, value);
                }
                MetricEvent::Duration { name, ms } => {
                    inner.durations.entry(name).or_default().record(ms);
                }
            }
        }
        inner.last_flush = Instant::now();
    }

    /// Flushes the buffer into the aggregates.
    pub async fn flush(&self) {
        let mut inner = self.inner.write().await;
        Self::flush_locked(&mut inner);
    }

    /// Flushes and returns a snapshot of all aggregates.
    pub async fn snapshot(&self) -> MetricsSummary {
        let mut inner = self.inner.write().await;
        Self::flush_locked(&mut inner);
        MetricsSummary {
            counters: inner.counters.clone(),
            gauges: inner.gauges.clone(),
            durations: inner.durations.clone(),
            generated_at: Utc::now(),
        }
    }

    // Domain helpers used by the orchestrator and API.

    /// Records an investigation started.
    pub async fn record_investigation_started(&self, tenant_id: &str) {
        self.increment_counter("caseflow_investigations_started_total")
            .await;
        self.increment_counter(&format!(
            "caseflow_investigations_started_total{{tenant=\"{tenant_id}\"}}"
        ))
        .await;
    }

    /// Records an investigation reaching a terminal status.
    pub async fn record_investigation_finished(&self, status: &str, duration_ms: u64) {
        self.increment_counter(&format!(
            "caseflow_investigations_finished_total{{status=\"{status}\"}}"
        ))
        .await;
        self.record_duration_ms("caseflow_investigation_duration_ms", duration_ms)
            .await;
    }

    /// Records an action execution outcome.
    pub async fn record_action_executed(&self, tool: &str, success: bool, duration_ms: u64) {
        let status = if success { "success" } else { "failure" };
        self.increment_counter(&format!(
            "caseflow_actions_executed_total{{tool=\"{tool}\",status=\"{status}\"}}"
        ))
        .await;
        self.record_duration_ms("caseflow_action_duration_ms", duration_ms)
            .await;
    }

    /// Records a policy decision.
    pub async fn record_policy_decision(&self, effect: &str) {
        self.increment_counter(&format!(
            "caseflow_policy_decisions_total{{effect=\"{effect}\"}}"
        ))
        .await;
    }

    /// Records a rejected request due to rate limiting.
    pub async fn record_rate_limited(&self, limiter: &str) {
        self.increment_counter(&format!(
            "caseflow_rate_limited_total{{limiter=\"{limiter}\"}}"
        ))
        .await;
    }

    /// Records the number of active investigations.
    pub async fn record_active_investigations(&self, count: usize) {
        self.set_gauge("caseflow_investigations_active", count as f64)
            .await;
    }

    /// Records the number of pending approval requests.
    pub async fn record_pending_approvals(&self, count: usize) {
        self.set_gauge("caseflow_pending_approvals", count as f64)
            .await;
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn eager_config() -> MetricsConfig {
        MetricsConfig {
            flush_interval: Duration::from_secs(600),
            buffer_size: 1,
        }
    }

    #[tokio::test]
    async fn test_counter_and_gauge() {
        let collector = MetricsCollector::new(eager_config());

        collector.increment_counter("requests").await;
        collector.increment_counter_by("requests", 4).await;
        collector.set_gauge("active", 3.0).await;
        collector.set_gauge("active", 7.0).await;

        let summary = collector.snapshot().await;
        assert_eq!(summary.counters["requests"], 5);
        assert_eq!(summary.gauges["active"], 7.0);
    }

    #[tokio::test]
    async fn test_duration_stats() {
        let collector = MetricsCollector::new(eager_config());

        for ms in [10, 20, 60] {
            collector.record_duration_ms("latency", ms).await;
        }

        let summary = collector.snapshot().await;
        let stats = &summary.durations["latency"];
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ms, 10);
        assert_eq!(stats.max_ms, 60);
        assert_eq!(stats.avg_ms(), 30);
    }

    #[tokio::test]
    async fn test_buffer_holds_until_flush() {
        let config = MetricsConfig {
            flush_interval: Duration::from_secs(600),
            buffer_size: 100,
        };
        let collector = MetricsCollector::new(config);

        collector.increment_counter("buffered").await;

        {
            let inner = collector.inner.read().await;
            assert_eq!(inner.buffer.len(), 1);
            assert!(inner.counters.is_empty());
        }

        collector.flush().await;

        let inner = collector.inner.read().await;
        assert!(inner.buffer.is_empty());
        assert_eq!(inner.counters["buffered"], 1);
    }

    #[tokio::test]
    async fn test_buffer_flushes_at_capacity() {
        let config = MetricsConfig {
            flush_interval: Duration::from_secs(600),
            buffer_size: 3,
        };
        let collector = MetricsCollector::new(config);

        for _ in 0..3 {
            collector.increment_counter("hits").await;
        }

        let inner = collector.inner.read().await;
        assert!(inner.buffer.is_empty());
        assert_eq!(inner.counters["hits"], 3);
    }

    #[tokio::test]
    async fn test_domain_helpers() {
        let collector = MetricsCollector::new(eager_config());

        collector.record_investigation_started("tenant-1").await;
        collector
            .record_investigation_finished("complete", 1500)
            .await;
        collector.record_action_executed("lookup_user", true, 40).await;
        collector.record_policy_decision("deny").await;
        collector.record_rate_limited("per_client").await;
        collector.record_active_investigations(2).await;

        let summary = collector.snapshot().await;
        assert_eq!(
            summary.counters["caseflow_investigations_started_total"],
            1
        );
        assert_eq!(
            summary.counters["caseflow_actions_executed_total{tool=\"lookup_user\",status=\"success\"}"],
            1
        );
        assert_eq!(summary.gauges["caseflow_investigations_active"], 2.0);
        assert_eq!(
            summary.durations["caseflow_investigation_duration_ms"].count,
            1
        );
    }
}
