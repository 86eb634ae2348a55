//! Top-level investigation orchestrator.
//!
//! Drives investigations through the lifecycle state machine, prevents
//! duplicates per alert/tenant pair, bounds concurrent work with a global
//! ceiling, and reacts to deadline events from the timeout manager.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventKind, AuditSink};
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::store::InvestigationStore;
use crate::timeout::{TimeoutHandler, TimeoutManager};
use crate::types::{
    ContextDocument, HumanFeedback, Investigation, InvestigationStatus, InvestigationStep,
};

/// Options for starting an investigation.
#[derive(Debug, Clone, Deserialize)]
pub struct StartOptions {
    pub user_id: String,
    pub tenant_id: String,
    pub priority: Option<u8>,
    pub timeout_ms: Option<u64>,
}

/// Resolves whether an alert exists before an investigation may start.
#[async_trait]
pub trait AlertLookup: Send + Sync {
    async fn alert_exists(&self, alert_id: &str, tenant_id: &str) -> Result<bool, CoreError>;
}

/// Lookup that accepts every alert id. Used when alert ingestion lives in
/// another system that has already validated the id.
pub struct AllowAllAlerts;

#[async_trait]
impl AlertLookup for AllowAllAlerts {
    async fn alert_exists(&self, _alert_id: &str, _tenant_id: &str) -> Result<bool, CoreError> {
        Ok(true)
    }
}

/// Counters describing orchestrator activity since startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub total_started: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_expired: u64,
    pub forced_terminations: u64,
    pub deadline_warnings: u64,
}

/// Status report combining persisted state with derived progress.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub investigation: Investigation,
    pub steps: Vec<InvestigationStep>,
    /// Percentage of finished steps, 0 when no steps exist yet.
    pub progress: f64,
    /// Estimated time to completion in milliseconds. Absent for terminal
    /// investigations.
    pub eta_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct ActiveEntry {
    tenant_id: String,
    status: InvestigationStatus,
    priority: u8,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    investigation_id: Uuid,
    tenant_id: String,
    priority: u8,
    enqueued_at: chrono::DateTime<Utc>,
}

type ActiveMap = Arc<RwLock<HashMap<Uuid, ActiveEntry>>>;
type Queue = Arc<RwLock<Vec<QueueEntry>>>;
type StatsCell = Arc<RwLock<OrchestratorStats>>;

/// Investigation lifecycle orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn InvestigationStore>,
    timeouts: Arc<TimeoutManager>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertLookup>,
    active: ActiveMap,
    queue: Queue,
    stats: StatsCell,
    kill_switch: Arc<RwLock<Option<String>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn InvestigationStore>,
        timeouts: Arc<TimeoutManager>,
        audit: Arc<dyn AuditSink>,
        alerts: Arc<dyn AlertLookup>,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            config,
            store,
            timeouts,
            audit,
            alerts,
            active: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(OrchestratorStats::default())),
            kill_switch: Arc::new(RwLock::new(None)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Wires this orchestrator up as the timeout manager's event handler.
    pub async fn install_timeout_handler(self: &Arc<Self>) {
        let handler = Arc::new(DeadlineHandler {
            store: self.store.clone(),
            active: self.active.clone(),
            queue: self.queue.clone(),
            stats: self.stats.clone(),
            audit: self.audit.clone(),
        });
        self.timeouts.set_handler(handler).await;
    }

    /// Starts a new investigation for an alert.
    #[instrument(skip(self, options), fields(alert_id = %alert_id, tenant_id = %options.tenant_id))]
    pub async fn start_investigation(
        &self,
        alert_id: &str,
        options: StartOptions,
    ) -> Result<Investigation, CoreError> {
        if alert_id.trim().is_empty() {
            return Err(CoreError::missing_field("alert_id"));
        }
        if options.user_id.trim().is_empty() {
            return Err(CoreError::missing_field("user_id"));
        }
        if options.tenant_id.trim().is_empty() {
            return Err(CoreError::missing_field("tenant_id"));
        }

        if let Some(reason) = self.kill_switch.read().await.as_ref() {
            return Err(CoreError::Conflict(format!(
                "kill switch active: {reason}"
            )));
        }

        if !self
            .alerts
            .alert_exists(alert_id, &options.tenant_id)
            .await?
        {
            return Err(CoreError::not_found("Alert", alert_id));
        }

        if let Some(existing) = self
            .store
            .find_open_by_alert(alert_id, &options.tenant_id)
            .await?
        {
            debug!(existing_id = %existing.id, "duplicate investigation rejected");
            return Err(CoreError::DuplicateInvestigation {
                alert_id: alert_id.to_string(),
                tenant_id: options.tenant_id.clone(),
            });
        }

        let timeout_ms = options
            .timeout_ms
            .unwrap_or(self.config.default_timeout.as_millis() as u64);
        let investigation = Investigation::new(
            alert_id.to_string(),
            options.tenant_id.clone(),
            options.user_id.clone(),
            options.priority.unwrap_or(3),
            timeout_ms,
        );

        self.store.save_investigation(&investigation).await?;
        self.timeouts
            .register(
                investigation.id,
                &investigation.tenant_id,
                Duration::from_millis(timeout_ms),
            )
            .await?;

        {
            let mut active = self.active.write().await;
            active.insert(
                investigation.id,
                ActiveEntry {
                    tenant_id: investigation.tenant_id.clone(),
                    status: investigation.status,
                    priority: investigation.priority,
                },
            );
        }
        {
            let mut queue = self.queue.write().await;
            queue.push(QueueEntry {
                investigation_id: investigation.id,
                tenant_id: investigation.tenant_id.clone(),
                priority: investigation.priority,
                enqueued_at: Utc::now(),
            });
        }

        self.stats.write().await.total_started += 1;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::InvestigationCreated,
                    &options.user_id,
                    format!("Investigation started for alert {alert_id}"),
                )
                .for_investigation(investigation.id)
                .with_details(json!({
                    "alert_id": alert_id,
                    "priority": investigation.priority,
                    "timeout_ms": timeout_ms,
                })),
            )
            .await;

        info!(investigation_id = %investigation.id, "investigation started");
        Ok(investigation)
    }

    /// Returns the current status with steps, progress, and an ETA.
    pub async fn get_investigation_status(
        &self,
        id: Uuid,
        tenant_id: &str,
    ) -> Result<StatusReport, CoreError> {
        let investigation = self
            .store
            .get_investigation(id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Investigation", id))?;
        let steps = self.store.list_steps(id).await?;

        let total = steps.len();
        let completed = steps
            .iter()
            .filter(|s| s.status == crate::types::StepStatus::Complete)
            .count();
        let progress = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        let eta_ms = if investigation.status.is_terminal() {
            None
        } else {
            let remaining = total.saturating_sub(completed);
            if remaining == 0 {
                Some(self.config.finalization_estimate.as_millis() as u64)
            } else {
                Some(
                    remaining as u64 * self.config.step_duration_estimate.as_millis() as u64,
                )
            }
        };

        Ok(StatusReport {
            investigation,
            steps,
            progress,
            eta_ms,
        })
    }

    /// Pauses an investigation. Valid only while it is in the active set;
    /// in-flight step work completes before the pause takes effect.
    #[instrument(skip(self), fields(investigation_id = %id))]
    pub async fn pause_investigation(
        &self,
        id: Uuid,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<(), CoreError> {
        {
            let active = self.active.read().await;
            let entry = active
                .get(&id)
                .ok_or_else(|| CoreError::not_found("Investigation", id))?;
            if entry.tenant_id != tenant_id {
                return Err(CoreError::not_found("Investigation", id));
            }
            if entry.status == InvestigationStatus::Paused {
                return Err(CoreError::Conflict(
                    "investigation is already paused".to_string(),
                ));
            }
        }

        self.apply_transition(id, tenant_id, InvestigationStatus::Paused, user_id)
            .await?;
        self.queue
            .write()
            .await
            .retain(|e| e.investigation_id != id);
        info!(investigation_id = %id, "investigation paused");
        Ok(())
    }

    /// Resumes a paused investigation at its original priority.
    #[instrument(skip(self), fields(investigation_id = %id))]
    pub async fn resume_investigation(
        &self,
        id: Uuid,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<(), CoreError> {
        let priority = {
            let active = self.active.read().await;
            let entry = active
                .get(&id)
                .ok_or_else(|| CoreError::not_found("Investigation", id))?;
            if entry.tenant_id != tenant_id {
                return Err(CoreError::not_found("Investigation", id));
            }
            if entry.status != InvestigationStatus::Paused {
                return Err(CoreError::Conflict(format!(
                    "cannot resume investigation in status '{}'",
                    entry.status
                )));
            }
            entry.priority
        };

        self.apply_transition(id, tenant_id, InvestigationStatus::Executing, user_id)
            .await?;
        self.queue.write().await.push(QueueEntry {
            investigation_id: id,
            tenant_id: tenant_id.to_string(),
            priority,
            enqueued_at: Utc::now(),
        });
        info!(investigation_id = %id, "investigation resumed");
        Ok(())
    }

    /// Appends human feedback and merges it into the context document.
    pub async fn add_human_feedback(
        &self,
        id: Uuid,
        feedback_type: &str,
        content: &str,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<(), CoreError> {
        if content.trim().is_empty() {
            return Err(CoreError::missing_field("content"));
        }
        let mut investigation = self
            .store
            .get_investigation(id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Investigation", id))?;

        let feedback = HumanFeedback::new(
            id,
            user_id.to_string(),
            feedback_type.to_string(),
            content.to_string(),
        );
        self.store.append_feedback(&feedback).await?;

        let entry = json!({
            "user_id": user_id,
            "type": feedback_type,
            "content": content,
            "created_at": feedback.created_at,
        });
        let mut merged = ContextDocument::new();
        let mut history = investigation
            .context
            .get("human_feedback")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        history.push(entry);
        merged.insert("human_feedback".to_string(), Value::Array(history));
        investigation.merge_context(merged);
        self.store.update_investigation(&investigation).await?;
        self.timeouts.record_activity(id).await;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::FeedbackAdded,
                    user_id,
                    format!("Feedback ({feedback_type}) added"),
                )
                .for_investigation(id),
            )
            .await;
        Ok(())
    }

    /// Records a step for an investigation and refreshes its activity
    /// marker. Step executors call this through the API layer.
    pub async fn record_step(&self, step: &InvestigationStep) -> Result<(), CoreError> {
        self.store.append_step(step).await?;
        self.timeouts.record_activity(step.investigation_id).await;
        Ok(())
    }

    /// Advances an investigation to the next lifecycle stage.
    pub async fn advance_stage(
        &self,
        id: Uuid,
        tenant_id: &str,
        actor: &str,
    ) -> Result<InvestigationStatus, CoreError> {
        let current = {
            let active = self.active.read().await;
            active
                .get(&id)
                .filter(|e| e.tenant_id == tenant_id)
                .map(|e| e.status)
                .ok_or_else(|| CoreError::not_found("Investigation", id))?
        };
        let next = current.next_stage().ok_or_else(|| {
            CoreError::Conflict(format!("no next stage from status '{current}'"))
        })?;
        self.apply_transition(id, tenant_id, next, actor).await?;
        self.timeouts.record_activity(id).await;
        Ok(next)
    }

    /// Drains the queue while the number of processing investigations is
    /// below the global ceiling. Pending entries are served in descending
    /// priority order.
    pub async fn process_queue(&self) -> Result<usize, CoreError> {
        if self.kill_switch.read().await.is_some() {
            return Ok(0);
        }

        let mut dispatched = 0;
        loop {
            let processing = {
                let active = self.active.read().await;
                active
                    .values()
                    .filter(|e| {
                        e.status.is_active() && e.status != InvestigationStatus::Planning
                    })
                    .count()
            };
            if processing >= self.config.max_concurrent_investigations {
                break;
            }

            let entry = {
                let mut queue = self.queue.write().await;
                if queue.is_empty() {
                    break;
                }
                queue.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(a.enqueued_at.cmp(&b.enqueued_at))
                });
                queue.remove(0)
            };

            let status = {
                let active = self.active.read().await;
                active.get(&entry.investigation_id).map(|e| e.status)
            };
            match status {
                Some(InvestigationStatus::Planning) => {
                    self.apply_transition(
                        entry.investigation_id,
                        &entry.tenant_id,
                        InvestigationStatus::Executing,
                        "orchestrator",
                    )
                    .await?;
                    dispatched += 1;
                }
                Some(InvestigationStatus::Executing) => {
                    // Resumed investigations are already executing.
                    dispatched += 1;
                }
                _ => {
                    // Terminated or paused while queued; drop the entry.
                    continue;
                }
            }
        }
        Ok(dispatched)
    }

    /// Expires investigations whose deadline passed without the timeout
    /// sweep catching them (e.g. records lost across a restart).
    pub async fn cleanup_expired_investigations(&self) -> Result<usize, CoreError> {
        let now = Utc::now();
        let stale: Vec<Investigation> = self
            .store
            .list_non_terminal()
            .await?
            .into_iter()
            .filter(|inv| inv.expires_at < now)
            .collect();

        let mut expired = 0;
        for mut inv in stale {
            if !inv.transition_to(InvestigationStatus::Expired) {
                continue;
            }
            self.store.update_investigation(&inv).await?;
            self.active.write().await.remove(&inv.id);
            self.queue
                .write()
                .await
                .retain(|e| e.investigation_id != inv.id);
            self.timeouts.cancel(inv.id).await;
            self.stats.write().await.total_expired += 1;
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventKind::InvestigationExpired,
                        "orchestrator",
                        "Investigation expired during cleanup scan",
                    )
                    .for_investigation(inv.id)
                    .failed(),
                )
                .await;
            expired += 1;
        }
        Ok(expired)
    }

    /// Marks an investigation complete, fast-forwarding through remaining
    /// stages so the transition sequence stays valid.
    #[instrument(skip(self, result), fields(investigation_id = %id))]
    pub async fn complete_investigation(
        &self,
        id: Uuid,
        tenant_id: &str,
        result: Value,
    ) -> Result<Investigation, CoreError> {
        let mut investigation = self
            .store
            .get_investigation(id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Investigation", id))?;

        if investigation.status == InvestigationStatus::Paused {
            return Err(CoreError::Conflict(
                "cannot complete a paused investigation".to_string(),
            ));
        }
        if investigation.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "investigation already in terminal status '{}'",
                investigation.status
            )));
        }

        while investigation.status != InvestigationStatus::Complete {
            let next = match investigation.status.next_stage() {
                Some(next) => next,
                None => break,
            };
            if !investigation.transition_to(next) {
                return Err(CoreError::Internal(format!(
                    "stage progression broke at '{}'",
                    investigation.status
                )));
            }
        }
        let mut merged = ContextDocument::new();
        merged.insert("result".to_string(), result);
        investigation.merge_context(merged);

        if let Err(e) = self.store.update_investigation(&investigation).await {
            self.mark_failed_after_storage_error(id, tenant_id, &e).await;
            return Err(e);
        }

        self.active.write().await.remove(&id);
        self.queue
            .write()
            .await
            .retain(|e| e.investigation_id != id);
        self.timeouts.cancel(id).await;
        self.stats.write().await.total_completed += 1;

        let duration_ms = investigation
            .completed_at
            .map(|done| (done - investigation.created_at).num_milliseconds())
            .unwrap_or(0);
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::InvestigationCompleted,
                    "orchestrator",
                    "Investigation completed",
                )
                .for_investigation(id)
                .with_details(json!({ "duration_ms": duration_ms })),
            )
            .await;
        info!(investigation_id = %id, duration_ms, "investigation completed");
        Ok(investigation)
    }

    /// Marks an investigation failed with a reason.
    pub async fn fail_investigation(
        &self,
        id: Uuid,
        tenant_id: &str,
        reason: &str,
    ) -> Result<(), CoreError> {
        let mut investigation = self
            .store
            .get_investigation(id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Investigation", id))?;
        if !investigation.transition_to(InvestigationStatus::Failed) {
            return Err(CoreError::Conflict(format!(
                "investigation already in terminal status '{}'",
                investigation.status
            )));
        }
        let mut merged = ContextDocument::new();
        merged.insert("failure_reason".to_string(), json!(reason));
        investigation.merge_context(merged);
        self.store.update_investigation(&investigation).await?;

        self.active.write().await.remove(&id);
        self.queue
            .write()
            .await
            .retain(|e| e.investigation_id != id);
        self.timeouts.cancel(id).await;
        self.stats.write().await.total_failed += 1;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::InvestigationStatusChanged,
                    "orchestrator",
                    format!("Investigation failed: {reason}"),
                )
                .for_investigation(id)
                .failed(),
            )
            .await;
        Ok(())
    }

    /// Blocks new investigations and halts queue processing.
    pub async fn activate_kill_switch(&self, reason: &str, actor: &str) {
        *self.kill_switch.write().await = Some(reason.to_string());
        warn!(reason = %reason, "kill switch activated");
        self.audit
            .record(AuditEvent::new(
                AuditEventKind::KillSwitchActivated,
                actor,
                format!("Kill switch activated: {reason}"),
            ))
            .await;
    }

    pub async fn deactivate_kill_switch(&self, actor: &str) {
        *self.kill_switch.write().await = None;
        info!("kill switch deactivated");
        self.audit
            .record(AuditEvent::new(
                AuditEventKind::KillSwitchDeactivated,
                actor,
                "Kill switch deactivated",
            ))
            .await;
    }

    pub async fn kill_switch_active(&self) -> bool {
        self.kill_switch.read().await.is_some()
    }

    /// Reloads non-terminal investigations from the store after a restart,
    /// rebuilding the active set, queue, and timeout records.
    pub async fn reconcile(&self) -> Result<usize, CoreError> {
        let open = self.store.list_non_terminal().await?;
        let now = Utc::now();
        let mut restored = 0;

        for inv in open {
            {
                let mut active = self.active.write().await;
                active.insert(
                    inv.id,
                    ActiveEntry {
                        tenant_id: inv.tenant_id.clone(),
                        status: inv.status,
                        priority: inv.priority,
                    },
                );
            }

            let remaining = (inv.expires_at - now).num_milliseconds();
            if remaining > 0 {
                // Already-registered records survive a double reconcile.
                let _ = self
                    .timeouts
                    .register(
                        inv.id,
                        &inv.tenant_id,
                        Duration::from_millis(remaining as u64),
                    )
                    .await;
            }

            if matches!(
                inv.status,
                InvestigationStatus::Planning | InvestigationStatus::Executing
            ) {
                self.queue.write().await.push(QueueEntry {
                    investigation_id: inv.id,
                    tenant_id: inv.tenant_id.clone(),
                    priority: inv.priority,
                    enqueued_at: Utc::now(),
                });
            }
            restored += 1;
        }

        if restored > 0 {
            info!(count = restored, "reconciled investigations from store");
        }
        Ok(restored)
    }

    /// Runs periodic queue processing and expiry cleanup until shutdown.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.config.queue_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.process_queue().await {
                        warn!(error = %e, "queue processing failed");
                    }
                    if let Err(e) = self.cleanup_expired_investigations().await {
                        warn!(error = %e, "expiry cleanup failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Stops the run loop and tears down timeout tracking. Safe under
    /// repeated signal delivery.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.timeouts.shutdown();
        self.timeouts.force_cleanup().await;
        self.audit
            .record(AuditEvent::new(
                AuditEventKind::SystemLifecycle,
                "orchestrator",
                "Orchestrator shut down",
            ))
            .await;
    }

    pub async fn stats(&self) -> OrchestratorStats {
        self.stats.read().await.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn queued_count(&self) -> usize {
        self.queue.read().await.len()
    }

    /// Applies a validated transition and persists it. A persistence
    /// failure marks the investigation failed outright; retrying belongs
    /// to the step executors, not here.
    async fn apply_transition(
        &self,
        id: Uuid,
        tenant_id: &str,
        next: InvestigationStatus,
        actor: &str,
    ) -> Result<(), CoreError> {
        let mut investigation = self
            .store
            .get_investigation(id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Investigation", id))?;
        let from = investigation.status;

        if !investigation.transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "invalid transition from '{from}' to '{next}'"
            )));
        }

        if let Err(e) = self.store.update_investigation(&investigation).await {
            self.mark_failed_after_storage_error(id, tenant_id, &e).await;
            return Err(e);
        }

        {
            let mut active = self.active.write().await;
            if next.is_terminal() {
                active.remove(&id);
            } else if let Some(entry) = active.get_mut(&id) {
                entry.status = next;
            }
        }

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::InvestigationStatusChanged,
                    actor,
                    format!("Status changed from '{from}' to '{next}'"),
                )
                .for_investigation(id),
            )
            .await;
        Ok(())
    }

    async fn mark_failed_after_storage_error(
        &self,
        id: Uuid,
        tenant_id: &str,
        error: &CoreError,
    ) {
        warn!(
            investigation_id = %id,
            error = %error,
            "persistence failed during transition, marking investigation failed"
        );
        self.active.write().await.remove(&id);
        self.queue
            .write()
            .await
            .retain(|e| e.investigation_id != id);
        self.timeouts.cancel(id).await;
        self.stats.write().await.total_failed += 1;

        // Best effort: the same store just failed, so this may fail too.
        if let Ok(Some(mut inv)) = self.store.get_investigation(id, tenant_id).await {
            if inv.transition_to(InvestigationStatus::Failed) {
                let _ = self.store.update_investigation(&inv).await;
            }
        }
    }
}

/// Timeout-manager handler that applies deadline outcomes to
/// investigations.
struct DeadlineHandler {
    store: Arc<dyn InvestigationStore>,
    active: ActiveMap,
    queue: Queue,
    stats: StatsCell,
    audit: Arc<dyn AuditSink>,
}

impl DeadlineHandler {
    async fn terminate(
        &self,
        id: Uuid,
        tenant_id: &str,
        status: InvestigationStatus,
        kind: AuditEventKind,
        description: &str,
    ) {
        match self.store.get_investigation(id, tenant_id).await {
            Ok(Some(mut inv)) => {
                if inv.transition_to(status) {
                    if let Err(e) = self.store.update_investigation(&inv).await {
                        warn!(investigation_id = %id, error = %e, "failed to persist deadline outcome");
                    }
                }
            }
            Ok(None) => {
                warn!(investigation_id = %id, "deadline fired for unknown investigation")
            }
            Err(e) => {
                warn!(investigation_id = %id, error = %e, "failed to load investigation for deadline outcome")
            }
        }

        self.active.write().await.remove(&id);
        self.queue
            .write()
            .await
            .retain(|e| e.investigation_id != id);
        self.audit
            .record(
                AuditEvent::new(kind, "timeout_manager", description)
                    .for_investigation(id)
                    .failed(),
            )
            .await;
    }
}

#[async_trait]
impl TimeoutHandler for DeadlineHandler {
    async fn on_warning(&self, investigation_id: Uuid, _tenant_id: &str) {
        self.stats.write().await.deadline_warnings += 1;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventKind::InvestigationWarning,
                    "timeout_manager",
                    "Investigation is approaching its deadline",
                )
                .for_investigation(investigation_id),
            )
            .await;
    }

    async fn on_graceful_timeout(&self, investigation_id: Uuid, tenant_id: &str) {
        self.stats.write().await.total_expired += 1;
        self.terminate(
            investigation_id,
            tenant_id,
            InvestigationStatus::Expired,
            AuditEventKind::InvestigationExpired,
            "Investigation deadline elapsed",
        )
        .await;
    }

    async fn on_forced_termination(&self, investigation_id: Uuid, tenant_id: &str) {
        {
            let mut stats = self.stats.write().await;
            stats.forced_terminations += 1;
            stats.total_failed += 1;
        }
        self.terminate(
            investigation_id,
            tenant_id,
            InvestigationStatus::Failed,
            AuditEventKind::InvestigationForceTerminated,
            "Investigation forcibly terminated past grace period",
        )
        .await;
    }
}
