//! Deadline and resource-ceiling tracking for active investigations.
//!
//! Each registered investigation carries three time markers: a warning at a
//! configurable fraction of its budget, the timeout itself, and a grace
//! deadline after which termination is forced. A periodic sweep classifies
//! records against these markers; a coarser resource sweep watches memory,
//! staleness, and per-investigation leaks.
//!
//! Records are in-memory only. The clock keeps running while an
//! investigation is paused; operators extend deadlines explicitly when
//! needed.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ResourceLimits, TimeoutConfig};
use crate::error::CoreError;

/// Status of a timeout record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStatus {
    Active,
    Cancelled,
    Expired,
}

/// In-memory deadline record, owned exclusively by the manager.
#[derive(Debug, Clone)]
pub struct TimeoutRecord {
    pub investigation_id: Uuid,
    pub tenant_id: String,
    pub start_time: DateTime<Utc>,
    pub warning_time: DateTime<Utc>,
    pub timeout_time: DateTime<Utc>,
    pub grace_time: DateTime<Utc>,
    pub status: TimeoutStatus,
    /// Total budget including extensions, used for the warning-reset rule.
    pub total_duration: ChronoDuration,
    pub warning_sent: bool,
    /// A resource violation grants one extension; never repeated.
    pub extended_for_resources: bool,
    pub last_activity: DateTime<Utc>,
}

/// Resource usage tracked 1:1 with a timeout record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub api_call_count: u32,
    pub evidence_count: u32,
    pub last_check: Option<DateTime<Utc>>,
    /// First memory snapshot, kept for leak detection.
    pub baseline_memory_bytes: Option<u64>,
}

/// Incremental usage update from a step executor.
#[derive(Debug, Clone, Default)]
pub struct ResourceUsageUpdate {
    pub memory_bytes: Option<u64>,
    pub api_calls: u32,
    pub evidence_items: u32,
}

/// Outcome of a resource-ceiling check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCheck {
    /// Human-readable description of the first violated ceiling, if any.
    pub violation: Option<String>,
    /// Whether this check granted the one-time extension.
    pub extended: bool,
}

/// Counters for sweep outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutStats {
    pub warnings_sent: u64,
    pub graceful_shutdowns: u64,
    pub forced_terminations: u64,
    pub resource_extensions: u64,
}

/// Receiver of deadline events. The orchestrator implements this to drive
/// expired/failed transitions.
#[async_trait]
pub trait TimeoutHandler: Send + Sync {
    async fn on_warning(&self, investigation_id: Uuid, tenant_id: &str);
    async fn on_graceful_timeout(&self, investigation_id: Uuid, tenant_id: &str);
    async fn on_forced_termination(&self, investigation_id: Uuid, tenant_id: &str);
}

enum SweepOutcome {
    Warning,
    Graceful,
    Forced,
}

/// Tracks per-investigation deadlines and resource ceilings.
pub struct TimeoutManager {
    config: TimeoutConfig,
    limits: ResourceLimits,
    records: Arc<RwLock<HashMap<Uuid, TimeoutRecord>>>,
    usage: Arc<RwLock<HashMap<Uuid, ResourceUsage>>>,
    handler: Arc<RwLock<Option<Arc<dyn TimeoutHandler>>>>,
    stats: Arc<RwLock<TimeoutStats>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TimeoutManager {
    pub fn new(config: TimeoutConfig, limits: ResourceLimits) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            limits,
            records: Arc::new(RwLock::new(HashMap::new())),
            usage: Arc::new(RwLock::new(HashMap::new())),
            handler: Arc::new(RwLock::new(None)),
            stats: Arc::new(RwLock::new(TimeoutStats::default())),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Installs the event handler. Must be called before the sweep loop
    /// starts for events to be delivered.
    pub async fn set_handler(&self, handler: Arc<dyn TimeoutHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Registers a deadline for an investigation.
    ///
    /// The clock does not stop while the investigation is paused.
    pub async fn register(
        &self,
        investigation_id: Uuid,
        tenant_id: &str,
        total: Duration,
    ) -> Result<(), CoreError> {
        let total = ChronoDuration::from_std(total)
            .map_err(|e| CoreError::Validation(format!("invalid timeout duration: {e}")))?;
        let now = Utc::now();
        let warning_offset = ChronoDuration::milliseconds(
            (total.num_milliseconds() as f64 * self.config.warning_fraction) as i64,
        );
        let grace = ChronoDuration::from_std(self.config.grace_period)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));

        let record = TimeoutRecord {
            investigation_id,
            tenant_id: tenant_id.to_string(),
            start_time: now,
            warning_time: now + warning_offset,
            timeout_time: now + total,
            grace_time: now + total + grace,
            status: TimeoutStatus::Active,
            total_duration: total,
            warning_sent: false,
            extended_for_resources: false,
            last_activity: now,
        };

        let mut records = self.records.write().await;
        if records.contains_key(&investigation_id) {
            return Err(CoreError::Conflict(format!(
                "timeout already registered for investigation {investigation_id}"
            )));
        }
        records.insert(investigation_id, record);
        self.usage
            .write()
            .await
            .insert(investigation_id, ResourceUsage::default());
        debug!(investigation_id = %investigation_id, "timeout registered");
        Ok(())
    }

    /// Cancels tracking for an investigation that finished normally.
    pub async fn cancel(&self, investigation_id: Uuid) {
        if let Some(mut record) = self.records.write().await.remove(&investigation_id) {
            record.status = TimeoutStatus::Cancelled;
            debug!(investigation_id = %investigation_id, "timeout cancelled");
        }
        self.usage.write().await.remove(&investigation_id);
    }

    /// Shifts the timeout and grace markers forward.
    ///
    /// Resets the warning flag when the extension exceeds 20% of the total
    /// budget, so a long extension produces a fresh warning later.
    pub async fn extend_timeout(
        &self,
        investigation_id: Uuid,
        additional: Duration,
    ) -> Result<(), CoreError> {
        let additional = ChronoDuration::from_std(additional)
            .map_err(|e| CoreError::Validation(format!("invalid extension: {e}")))?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&investigation_id)
            .ok_or_else(|| CoreError::not_found("TimeoutRecord", investigation_id))?;

        record.timeout_time += additional;
        record.grace_time += additional;
        if additional.num_milliseconds() as f64
            > record.total_duration.num_milliseconds() as f64 * 0.2
        {
            record.warning_sent = false;
            record.warning_time = Utc::now()
                + ChronoDuration::milliseconds(
                    (additional.num_milliseconds() as f64 * self.config.warning_fraction)
                        as i64,
                );
        }
        record.total_duration += additional;
        info!(
            investigation_id = %investigation_id,
            additional_ms = additional.num_milliseconds(),
            "timeout extended"
        );
        Ok(())
    }

    /// Records activity so the staleness sweep leaves the investigation
    /// alone.
    pub async fn record_activity(&self, investigation_id: Uuid) {
        if let Some(record) = self.records.write().await.get_mut(&investigation_id) {
            record.last_activity = Utc::now();
        }
    }

    /// Updates usage counters and checks the configured ceilings.
    ///
    /// A violation grants a one-time extension so the investigation can
    /// wind down, rather than terminating it outright.
    pub async fn record_resource_usage(
        &self,
        investigation_id: Uuid,
        update: ResourceUsageUpdate,
    ) -> Result<ResourceCheck, CoreError> {
        let violation = {
            let mut usage_map = self.usage.write().await;
            let usage = usage_map
                .get_mut(&investigation_id)
                .ok_or_else(|| CoreError::not_found("ResourceUsage", investigation_id))?;

            if let Some(mem) = update.memory_bytes {
                if usage.baseline_memory_bytes.is_none() {
                    usage.baseline_memory_bytes = Some(mem);
                }
                usage.memory_bytes = mem;
            }
            usage.api_call_count += update.api_calls;
            usage.evidence_count += update.evidence_items;
            usage.last_check = Some(Utc::now());

            if usage.memory_bytes > self.limits.max_memory_bytes {
                Some(format!(
                    "memory {} exceeds ceiling {}",
                    usage.memory_bytes, self.limits.max_memory_bytes
                ))
            } else if usage.api_call_count > self.limits.max_api_calls {
                Some(format!(
                    "api calls {} exceed ceiling {}",
                    usage.api_call_count, self.limits.max_api_calls
                ))
            } else if usage.evidence_count > self.limits.max_evidence_items {
                Some(format!(
                    "evidence items {} exceed ceiling {}",
                    usage.evidence_count, self.limits.max_evidence_items
                ))
            } else {
                None
            }
        };

        self.record_activity(investigation_id).await;

        let Some(violation) = violation else {
            return Ok(ResourceCheck {
                violation: None,
                extended: false,
            });
        };

        let already_extended = {
            let records = self.records.read().await;
            records
                .get(&investigation_id)
                .map(|r| r.extended_for_resources)
                .unwrap_or(true)
        };

        if already_extended {
            warn!(
                investigation_id = %investigation_id,
                violation = %violation,
                "resource ceiling violated, extension already spent"
            );
            return Ok(ResourceCheck {
                violation: Some(violation),
                extended: false,
            });
        }

        self.extend_timeout(investigation_id, self.config.resource_violation_extension)
            .await?;
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(&investigation_id) {
                record.extended_for_resources = true;
            }
        }
        self.stats.write().await.resource_extensions += 1;
        warn!(
            investigation_id = %investigation_id,
            violation = %violation,
            "resource ceiling violated, one-time extension granted"
        );
        Ok(ResourceCheck {
            violation: Some(violation),
            extended: true,
        })
    }

    /// Runs one deadline sweep at the given instant.
    ///
    /// Records transition out of `Active` inside the lock, so an
    /// overlapping sweep cannot terminate the same investigation twice.
    pub async fn sweep_once(&self, now: DateTime<Utc>) {
        let due: Vec<(Uuid, String, SweepOutcome)> = {
            let mut records = self.records.write().await;
            let mut due = Vec::new();
            let mut remove = Vec::new();

            for record in records.values_mut() {
                if record.status != TimeoutStatus::Active {
                    continue;
                }
                if now >= record.grace_time {
                    record.status = TimeoutStatus::Expired;
                    remove.push(record.investigation_id);
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Forced,
                    ));
                } else if now >= record.timeout_time {
                    record.status = TimeoutStatus::Expired;
                    remove.push(record.investigation_id);
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Graceful,
                    ));
                } else if now >= record.warning_time && !record.warning_sent {
                    record.warning_sent = true;
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Warning,
                    ));
                }
            }
            for id in remove {
                records.remove(&id);
            }
            due
        };

        if due.is_empty() {
            return;
        }

        self.dispatch_outcomes(due).await;
    }

    /// Runs one resource sweep: staleness, per-investigation memory leaks,
    /// and the global tracked-memory ceiling.
    pub async fn resource_sweep_once(&self, now: DateTime<Utc>) {
        let inactivity = ChronoDuration::from_std(self.config.inactivity_window)
            .unwrap_or_else(|_| ChronoDuration::minutes(10));

        let due: Vec<(Uuid, String, SweepOutcome)> = {
            let mut records = self.records.write().await;
            let usage_map = self.usage.read().await;
            let mut due = Vec::new();
            let mut remove = Vec::new();

            let total_memory: u64 = records
                .values()
                .filter(|r| r.status == TimeoutStatus::Active)
                .filter_map(|r| usage_map.get(&r.investigation_id))
                .map(|u| u.memory_bytes)
                .sum();
            let over_global = total_memory > self.config.max_tracked_memory_bytes;

            // Under global pressure the oldest active record is reclaimed.
            let oldest = records
                .values()
                .filter(|r| r.status == TimeoutStatus::Active)
                .min_by_key(|r| r.start_time)
                .map(|r| r.investigation_id);

            for record in records.values_mut() {
                if record.status != TimeoutStatus::Active {
                    continue;
                }
                let leaked = usage_map
                    .get(&record.investigation_id)
                    .and_then(|u| {
                        u.baseline_memory_bytes
                            .map(|base| u.memory_bytes.saturating_sub(base))
                    })
                    .map(|growth| growth > self.config.memory_leak_threshold_bytes)
                    .unwrap_or(false);

                if leaked {
                    record.status = TimeoutStatus::Expired;
                    remove.push(record.investigation_id);
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Forced,
                    ));
                } else if now - record.last_activity > inactivity {
                    record.status = TimeoutStatus::Expired;
                    remove.push(record.investigation_id);
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Graceful,
                    ));
                } else if over_global && Some(record.investigation_id) == oldest {
                    record.status = TimeoutStatus::Expired;
                    remove.push(record.investigation_id);
                    due.push((
                        record.investigation_id,
                        record.tenant_id.clone(),
                        SweepOutcome::Graceful,
                    ));
                }
            }
            for id in &remove {
                records.remove(id);
            }
            due
        };

        if !due.is_empty() {
            let mut usage = self.usage.write().await;
            for (id, _, _) in &due {
                usage.remove(id);
            }
            drop(usage);
            self.dispatch_outcomes(due).await;
        }
    }

    async fn dispatch_outcomes(&self, due: Vec<(Uuid, String, SweepOutcome)>) {
        let handler = self.handler.read().await.clone();
        let mut stats = self.stats.write().await;
        for (id, _tenant, outcome) in &due {
            match outcome {
                SweepOutcome::Warning => stats.warnings_sent += 1,
                SweepOutcome::Graceful => stats.graceful_shutdowns += 1,
                SweepOutcome::Forced => stats.forced_terminations += 1,
            }
            match outcome {
                SweepOutcome::Warning => {
                    warn!(investigation_id = %id, "investigation approaching deadline")
                }
                SweepOutcome::Graceful => {
                    info!(investigation_id = %id, "investigation deadline elapsed")
                }
                SweepOutcome::Forced => {
                    warn!(investigation_id = %id, "investigation past grace period, forcing termination")
                }
            }
        }
        drop(stats);

        if let Some(handler) = handler {
            for (id, tenant, outcome) in due {
                match outcome {
                    SweepOutcome::Warning => handler.on_warning(id, &tenant).await,
                    SweepOutcome::Graceful => handler.on_graceful_timeout(id, &tenant).await,
                    SweepOutcome::Forced => handler.on_forced_termination(id, &tenant).await,
                }
            }
        }
    }

    /// Terminates tracking for all active records. Safe to call repeatedly,
    /// including with zero active records.
    pub async fn force_cleanup(&self) -> usize {
        let cleared: Vec<Uuid> = {
            let mut records = self.records.write().await;
            let ids: Vec<Uuid> = records.keys().copied().collect();
            records.clear();
            ids
        };
        self.usage.write().await.clear();
        if !cleared.is_empty() {
            info!(count = cleared.len(), "force cleanup terminated all tracked records");
        }
        cleared.len()
    }

    /// Spawns the periodic sweep loops. Returns once shutdown is signalled.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let multiplier = self.config.resource_sweep_multiplier.max(1);
        let mut tick: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick = tick.wrapping_add(1);
                    let now = Utc::now();
                    self.sweep_once(now).await;
                    if tick % multiplier == 0 {
                        self.resource_sweep_once(now).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.force_cleanup().await;
                        break;
                    }
                }
            }
        }
    }

    /// Signals the sweep loop to stop. Safe under repeated delivery.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn stats(&self) -> TimeoutStats {
        self.stats.read().await.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status == TimeoutStatus::Active)
            .count()
    }

    /// Snapshot of a tracked record, mainly for status endpoints and tests.
    pub async fn get_record(&self, investigation_id: Uuid) -> Option<TimeoutRecord> {
        self.records.read().await.get(&investigation_id).cloned()
    }

    pub async fn get_usage(&self, investigation_id: Uuid) -> Option<ResourceUsage> {
        self.usage.read().await.get(&investigation_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        warnings: AtomicU32,
        graceful: AtomicU32,
        forced: AtomicU32,
    }

    #[async_trait]
    impl TimeoutHandler for CountingHandler {
        async fn on_warning(&self, _id: Uuid, _tenant: &str) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_graceful_timeout(&self, _id: Uuid, _tenant: &str) {
            self.graceful.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_forced_termination(&self, _id: Uuid, _tenant: &str) {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager() -> (TimeoutManager, Arc<CountingHandler>) {
        let manager = TimeoutManager::new(TimeoutConfig::default(), ResourceLimits::default());
        let handler = Arc::new(CountingHandler::default());
        (manager, handler)
    }

    #[tokio::test]
    async fn test_register_and_duplicate() {
        let (manager, _) = manager();
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(10))
            .await
            .unwrap();
        let result = manager.register(id, "tenant-1", Duration::from_secs(10)).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert_eq!(manager.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_warning_fires_exactly_once() {
        let (manager, handler) = manager();
        manager.set_handler(handler.clone()).await;
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(10))
            .await
            .unwrap();

        let warning_at = Utc::now() + ChronoDuration::seconds(9);
        manager.sweep_once(warning_at).await;
        manager.sweep_once(warning_at).await;

        assert_eq!(handler.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(handler.graceful.load(Ordering::SeqCst), 0);
        let stats = manager.stats().await;
        assert_eq!(stats.warnings_sent, 1);
    }

    #[tokio::test]
    async fn test_graceful_before_grace_forced_after() {
        let (manager, handler) = manager();
        manager.set_handler(handler.clone()).await;

        // Past timeout but before grace: exactly one graceful shutdown.
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(1))
            .await
            .unwrap();
        let after_timeout = Utc::now() + ChronoDuration::seconds(30);
        manager.sweep_once(after_timeout).await;
        manager.sweep_once(after_timeout).await;
        assert_eq!(handler.graceful.load(Ordering::SeqCst), 1);
        assert_eq!(handler.forced.load(Ordering::SeqCst), 0);

        // Past grace without intervening cleanup: forced termination.
        let id2 = Uuid::new_v4();
        manager
            .register(id2, "tenant-1", Duration::from_secs(1))
            .await
            .unwrap();
        let after_grace = Utc::now() + ChronoDuration::seconds(120);
        manager.sweep_once(after_grace).await;
        assert_eq!(handler.forced.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_expiry() {
        let (manager, handler) = manager();
        manager.set_handler(handler.clone()).await;
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(1))
            .await
            .unwrap();
        manager.cancel(id).await;

        manager
            .sweep_once(Utc::now() + ChronoDuration::seconds(300))
            .await;
        assert_eq!(handler.graceful.load(Ordering::SeqCst), 0);
        assert_eq!(handler.forced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extend_timeout_resets_warning_on_large_extension() {
        let (manager, _) = manager();
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(10))
            .await
            .unwrap();

        // Trip the warning first.
        manager
            .sweep_once(Utc::now() + ChronoDuration::seconds(9))
            .await;
        assert!(manager.get_record(id).await.unwrap().warning_sent);

        // 50% extension resets the flag.
        manager
            .extend_timeout(id, Duration::from_secs(5))
            .await
            .unwrap();
        let record = manager.get_record(id).await.unwrap();
        assert!(!record.warning_sent);

        // A tiny extension does not.
        manager
            .sweep_once(record.warning_time + ChronoDuration::seconds(1))
            .await;
        assert!(manager.get_record(id).await.unwrap().warning_sent);
        manager
            .extend_timeout(id, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(manager.get_record(id).await.unwrap().warning_sent);
    }

    #[tokio::test]
    async fn test_resource_violation_extends_once() {
        let limits = ResourceLimits {
            max_api_calls: 5,
            ..Default::default()
        };
        let manager = TimeoutManager::new(TimeoutConfig::default(), limits);
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(10))
            .await
            .unwrap();
        let deadline_before = manager.get_record(id).await.unwrap().timeout_time;

        let check = manager
            .record_resource_usage(
                id,
                ResourceUsageUpdate {
                    api_calls: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(check.violation.is_some());
        assert!(check.extended);
        let deadline_after = manager.get_record(id).await.unwrap().timeout_time;
        assert!(deadline_after > deadline_before);

        // Second violation does not extend again.
        let check = manager
            .record_resource_usage(
                id,
                ResourceUsageUpdate {
                    api_calls: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(check.violation.is_some());
        assert!(!check.extended);
        assert_eq!(
            manager.get_record(id).await.unwrap().timeout_time,
            deadline_after
        );
        assert_eq!(manager.stats().await.resource_extensions, 1);
    }

    #[tokio::test]
    async fn test_resource_sweep_stale_investigation_is_graceful() {
        let config = TimeoutConfig {
            inactivity_window: Duration::from_secs(60),
            ..Default::default()
        };
        let manager = TimeoutManager::new(config, ResourceLimits::default());
        let handler = Arc::new(CountingHandler::default());
        manager.set_handler(handler.clone()).await;

        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(3600))
            .await
            .unwrap();

        manager
            .resource_sweep_once(Utc::now() + ChronoDuration::seconds(120))
            .await;
        assert_eq!(handler.graceful.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_resource_sweep_memory_leak_is_forced() {
        let config = TimeoutConfig {
            memory_leak_threshold_bytes: 1000,
            ..Default::default()
        };
        let manager = TimeoutManager::new(config, ResourceLimits::default());
        let handler = Arc::new(CountingHandler::default());
        manager.set_handler(handler.clone()).await;

        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(3600))
            .await
            .unwrap();
        manager
            .record_resource_usage(
                id,
                ResourceUsageUpdate {
                    memory_bytes: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        manager
            .record_resource_usage(
                id,
                ResourceUsageUpdate {
                    memory_bytes: Some(10_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        manager.resource_sweep_once(Utc::now()).await;
        assert_eq!(handler.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_cleanup_idempotent() {
        let (manager, _) = manager();
        let id = Uuid::new_v4();
        manager
            .register(id, "tenant-1", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(manager.force_cleanup().await, 1);
        assert_eq!(manager.force_cleanup().await, 0);
        assert_eq!(manager.force_cleanup().await, 0);
        assert_eq!(manager.active_count().await, 0);
    }
}
