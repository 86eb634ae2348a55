//! Audit seam for orchestration events.
//!
//! The orchestrator reports lifecycle events through [`AuditSink`] without
//! caring where they land. Implementations must swallow their own write
//! failures; audit problems never abort the primary operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kinds of orchestration events worth auditing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    SystemLifecycle,
    InvestigationCreated,
    InvestigationStatusChanged,
    InvestigationWarning,
    InvestigationExpired,
    InvestigationForceTerminated,
    InvestigationCompleted,
    FeedbackAdded,
    KillSwitchActivated,
    KillSwitchDeactivated,
    Custom(String),
}

/// One orchestration event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub investigation_id: Option<Uuid>,
    pub actor: String,
    pub description: String,
    pub details: Value,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, actor: &str, description: impl Into<String>) -> Self {
        Self {
            kind,
            investigation_id: None,
            actor: actor.to_string(),
            description: description.into(),
            details: Value::Null,
            success: true,
        }
    }

    pub fn for_investigation(mut self, id: Uuid) -> Self {
        self.investigation_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Destination for orchestration events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an event. Implementations log and swallow their own
    /// failures.
    async fn record(&self, event: AuditEvent);
}

/// Sink that discards all events. Useful in tests.
pub struct NoopAudit;

#[async_trait]
impl AuditSink for NoopAudit {
    async fn record(&self, _event: AuditEvent) {}
}
