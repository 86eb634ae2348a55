//! Audit trail for Caseflow.
//!
//! In-memory, bounded audit log implementing the core sink traits. The
//! orchestrator and executor report events here; writes never fail the
//! primary operation.

use async_trait::async_trait;
use caseflow_core::audit::{AuditEvent, AuditEventKind, AuditSink};
use caseflow_core::executor::ActionAuditSink;
use caseflow_core::{ActionExecutionRecord, CoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    pub kind: AuditEventKind,
    /// Actor (user or system component).
    pub actor: String,
    /// Investigation ID (if applicable).
    pub investigation_id: Option<Uuid>,
    /// Description of the event.
    pub description: String,
    /// Additional details.
    pub details: serde_json::Value,
    /// Whether the audited operation succeeded.
    pub success: bool,
}

impl From<AuditEvent> for AuditLogEntry {
    fn from(event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: event.kind,
            actor: event.actor,
            investigation_id: event.investigation_id,
            description: event.description,
            details: event.details,
            success: event.success,
        }
    }
}

/// Audit log with bounded in-memory storage.
///
/// Oldest entries are evicted once `max_entries` is reached. Action
/// execution records are kept in a separate bounded store so the API can
/// serve them back.
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditLogEntry>>>,
    executions: Arc<RwLock<VecDeque<ActionExecutionRecord>>>,
    /// Maximum entries to keep in memory.
    max_entries: usize,
    /// Whether to also log to tracing.
    log_to_tracing: bool,
}

impl AuditLog {
    /// Creates a new audit log.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            executions: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            max_entries,
            log_to_tracing: true,
        }
    }

    /// Creates an audit log without tracing output.
    pub fn without_tracing(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            executions: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            max_entries,
            log_to_tracing: false,
        }
    }

    /// Appends an entry, evicting the oldest past the bound.
    pub async fn log(&self, entry: AuditLogEntry) {
        if self.log_to_tracing {
            info!(
                kind = ?entry.kind,
                actor = %entry.actor,
                investigation_id = ?entry.investigation_id,
                success = entry.success,
                "Audit: {}",
                entry.description
            );
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Gets all entries, oldest first.
    pub async fn get_entries(&self) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries.iter().cloned().collect()
    }

    /// Gets entries for a specific investigation.
    pub async fn get_investigation_entries(&self, investigation_id: Uuid) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.investigation_id == Some(investigation_id))
            .cloned()
            .collect()
    }

    /// Gets entries by event kind.
    pub async fn get_entries_by_kind(&self, kind: AuditEventKind) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Gets entries by actor.
    pub async fn get_entries_by_actor(&self, actor: &str) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.actor == actor)
            .cloned()
            .collect()
    }

    /// Gets entries within a time range.
    pub async fn get_entries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Gets recorded action executions, oldest first.
    pub async fn get_executions(&self) -> Vec<ActionExecutionRecord> {
        let executions = self.executions.read().await;
        executions.iter().cloned().collect()
    }

    /// Gets action executions for a tenant.
    pub async fn get_executions_for_tenant(&self, tenant_id: &str) -> Vec<ActionExecutionRecord> {
        let executions = self.executions.read().await;
        executions
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Exports entries as JSON.
    pub async fn export_json(&self) -> String {
        let entries = self.get_entries().await;
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Gets the number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Checks if the audit log is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.executions.write().await.clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn record(&self, event: AuditEvent) {
        self.log(event.into()).await;
    }
}

#[async_trait]
impl ActionAuditSink for AuditLog {
    async fn record_execution(&self, record: ActionExecutionRecord) -> Result<(), CoreError> {
        let mut executions = self.executions.write().await;
        if executions.len() >= self.max_entries {
            executions.pop_front();
        }
        executions.push_back(record);
        Ok(())
    }
}
