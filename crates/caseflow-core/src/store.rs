//! Persistence seam for investigations, steps, and feedback.
//!
//! The in-memory implementation backs tests and single-process deployments.
//! It is the source of truth only for the lifetime of the process; a
//! relational implementation can plug in behind [`InvestigationStore`]
//! without model changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{
    HumanFeedback, Investigation, InvestigationStatus, InvestigationStep,
};

/// Filter for listing investigations.
#[derive(Debug, Clone, Default)]
pub struct InvestigationFilter {
    pub tenant_id: Option<String>,
    pub status: Option<InvestigationStatus>,
    pub priority: Option<u8>,
    pub alert_id: Option<String>,
    pub case_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl InvestigationFilter {
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            limit: 50,
            ..Default::default()
        }
    }

    fn matches(&self, inv: &Investigation) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if &inv.tenant_id != tenant {
                return false;
            }
        }
        if let Some(status) = self.status {
            if inv.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if inv.priority != priority {
                return false;
            }
        }
        if let Some(alert_id) = &self.alert_id {
            if &inv.alert_id != alert_id {
                return false;
            }
        }
        if let Some(case_id) = &self.case_id {
            if inv.case_id.as_deref() != Some(case_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Aggregate investigation statistics over a timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationStats {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
    pub completed: u64,
    pub failed: u64,
    pub expired: u64,
    /// Average wall-clock duration of completed investigations, in
    /// milliseconds.
    pub avg_completion_ms: Option<u64>,
    /// completed / total, 0 when no investigations were recorded.
    pub completion_rate: f64,
}

/// Persistence operations for investigations.
#[async_trait]
pub trait InvestigationStore: Send + Sync {
    async fn save_investigation(&self, inv: &Investigation) -> Result<(), CoreError>;
    async fn get_investigation(
        &self,
        id: Uuid,
        tenant_id: &str,
    ) -> Result<Option<Investigation>, CoreError>;
    async fn update_investigation(&self, inv: &Investigation) -> Result<(), CoreError>;
    /// Finds a non-terminal investigation for the alert/tenant pair, if any.
    async fn find_open_by_alert(
        &self,
        alert_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Investigation>, CoreError>;
    async fn list_investigations(
        &self,
        filter: &InvestigationFilter,
    ) -> Result<(Vec<Investigation>, usize), CoreError>;
    /// All non-terminal investigations, for startup reconciliation.
    async fn list_non_terminal(&self) -> Result<Vec<Investigation>, CoreError>;
    async fn append_step(&self, step: &InvestigationStep) -> Result<(), CoreError>;
    async fn update_step(&self, step: &InvestigationStep) -> Result<(), CoreError>;
    /// Steps ordered by their monotonic order key.
    async fn list_steps(
        &self,
        investigation_id: Uuid,
    ) -> Result<Vec<InvestigationStep>, CoreError>;
    async fn append_feedback(&self, feedback: &HumanFeedback) -> Result<(), CoreError>;
    async fn list_feedback(
        &self,
        investigation_id: Uuid,
    ) -> Result<Vec<HumanFeedback>, CoreError>;
    async fn stats_since(&self, since: DateTime<Utc>) -> Result<InvestigationStats, CoreError>;
}

/// In-memory store. Non-durable.
pub struct InMemoryStore {
    investigations: Arc<RwLock<HashMap<Uuid, Investigation>>>,
    steps: Arc<RwLock<HashMap<Uuid, Vec<InvestigationStep>>>>,
    feedback: Arc<RwLock<HashMap<Uuid, Vec<HumanFeedback>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            investigations: Arc::new(RwLock::new(HashMap::new())),
            steps: Arc::new(RwLock::new(HashMap::new())),
            feedback: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvestigationStore for InMemoryStore {
    async fn save_investigation(&self, inv: &Investigation) -> Result<(), CoreError> {
        self.investigations
            .write()
            .await
            .insert(inv.id, inv.clone());
        Ok(())
    }

    async fn get_investigation(
        &self,
        id: Uuid,
        tenant_id: &str,
    ) -> Result<Option<Investigation>, CoreError> {
        let investigations = self.investigations.read().await;
        Ok(investigations
            .get(&id)
            .filter(|inv| inv.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_investigation(&self, inv: &Investigation) -> Result<(), CoreError> {
        let mut investigations = self.investigations.write().await;
        if !investigations.contains_key(&inv.id) {
            return Err(CoreError::not_found("Investigation", inv.id));
        }
        investigations.insert(inv.id, inv.clone());
        Ok(())
    }

    async fn find_open_by_alert(
        &self,
        alert_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Investigation>, CoreError> {
        let investigations = self.investigations.read().await;
        Ok(investigations
            .values()
            .find(|inv| {
                inv.alert_id == alert_id
                    && inv.tenant_id == tenant_id
                    && !inv.status.is_terminal()
            })
            .cloned())
    }

    async fn list_investigations(
        &self,
        filter: &InvestigationFilter,
    ) -> Result<(Vec<Investigation>, usize), CoreError> {
        let investigations = self.investigations.read().await;
        let mut matched: Vec<Investigation> = investigations
            .values()
            .filter(|inv| filter.matches(inv))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len();
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let page = matched
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();
        Ok((page, total))
    }

    async fn list_non_terminal(&self) -> Result<Vec<Investigation>, CoreError> {
        let investigations = self.investigations.read().await;
        Ok(investigations
            .values()
            .filter(|inv| !inv.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn append_step(&self, step: &InvestigationStep) -> Result<(), CoreError> {
        let mut steps = self.steps.write().await;
        steps
            .entry(step.investigation_id)
            .or_default()
            .push(step.clone());
        Ok(())
    }

    async fn update_step(&self, step: &InvestigationStep) -> Result<(), CoreError> {
        let mut steps = self.steps.write().await;
        let list = steps
            .get_mut(&step.investigation_id)
            .ok_or_else(|| CoreError::not_found("Investigation", step.investigation_id))?;
        match list.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => {
                *existing = step.clone();
                Ok(())
            }
            None => Err(CoreError::not_found("InvestigationStep", step.id)),
        }
    }

    async fn list_steps(
        &self,
        investigation_id: Uuid,
    ) -> Result<Vec<InvestigationStep>, CoreError> {
        let steps = self.steps.read().await;
        let mut list = steps.get(&investigation_id).cloned().unwrap_or_default();
        list.sort_by_key(|s| s.step_order);
        Ok(list)
    }

    async fn append_feedback(&self, feedback: &HumanFeedback) -> Result<(), CoreError> {
        let mut all = self.feedback.write().await;
        all.entry(feedback.investigation_id)
            .or_default()
            .push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(
        &self,
        investigation_id: Uuid,
    ) -> Result<Vec<HumanFeedback>, CoreError> {
        let all = self.feedback.read().await;
        Ok(all.get(&investigation_id).cloned().unwrap_or_default())
    }

    async fn stats_since(&self, since: DateTime<Utc>) -> Result<InvestigationStats, CoreError> {
        let investigations = self.investigations.read().await;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;
        let mut completed = 0u64;
        let mut failed = 0u64;
        let mut expired = 0u64;
        let mut completion_ms: Vec<u64> = Vec::new();

        for inv in investigations.values() {
            if inv.created_at < since {
                continue;
            }
            total += 1;
            *by_status.entry(inv.status.as_db_str().to_string()).or_insert(0) += 1;
            match inv.status {
                InvestigationStatus::Complete => {
                    completed += 1;
                    if let Some(done) = inv.completed_at {
                        completion_ms
                            .push((done - inv.created_at).num_milliseconds().max(0) as u64);
                    }
                }
                InvestigationStatus::Failed => failed += 1,
                InvestigationStatus::Expired => expired += 1,
                _ => {}
            }
        }

        let avg_completion_ms = if completion_ms.is_empty() {
            None
        } else {
            Some(completion_ms.iter().sum::<u64>() / completion_ms.len() as u64)
        };
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        Ok(InvestigationStats {
            total,
            by_status,
            completed,
            failed,
            expired,
            avg_completion_ms,
            completion_rate,
        })
    }
}
