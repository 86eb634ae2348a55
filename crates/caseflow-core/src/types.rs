//! Core data models for investigations.
//!
//! An investigation tracks the automated processing of one security alert
//! through sequential stages. Steps are recorded by external agent
//! executors; feedback is appended by humans.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status of an investigation through its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    /// Initial planning stage after creation.
    Planning,
    /// Steps are actively being executed.
    Executing,
    /// Collected evidence is being analyzed.
    Analyzing,
    /// Response actions are being prepared or executed.
    Responding,
    /// Paused by an operator; resumable.
    Paused,
    /// Finished successfully. Terminal.
    Complete,
    /// Finished with an unrecoverable error or forced termination. Terminal.
    Failed,
    /// Deadline elapsed before completion. Terminal.
    Expired,
}

impl InvestigationStatus {
    /// Returns the database-compatible string representation (snake_case).
    pub fn as_db_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Planning => "planning",
            InvestigationStatus::Executing => "executing",
            InvestigationStatus::Analyzing => "analyzing",
            InvestigationStatus::Responding => "responding",
            InvestigationStatus::Paused => "paused",
            InvestigationStatus::Complete => "complete",
            InvestigationStatus::Failed => "failed",
            InvestigationStatus::Expired => "expired",
        }
    }

    /// Parses a status from a database string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(InvestigationStatus::Planning),
            "executing" => Some(InvestigationStatus::Executing),
            "analyzing" => Some(InvestigationStatus::Analyzing),
            "responding" => Some(InvestigationStatus::Responding),
            "paused" => Some(InvestigationStatus::Paused),
            "complete" => Some(InvestigationStatus::Complete),
            "failed" => Some(InvestigationStatus::Failed),
            "expired" => Some(InvestigationStatus::Expired),
            _ => None,
        }
    }

    /// True for states that never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvestigationStatus::Complete
                | InvestigationStatus::Failed
                | InvestigationStatus::Expired
        )
    }

    /// True for non-terminal, non-paused states. Only active investigations
    /// count toward the global concurrency ceiling.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != InvestigationStatus::Paused
    }

    /// Validates a transition from this status to `next`.
    ///
    /// Active states advance in order, may pause, and may fail or expire at
    /// any point. Paused investigations resume into `Executing`. Terminal
    /// states accept no transitions.
    pub fn can_transition_to(&self, next: InvestigationStatus) -> bool {
        use InvestigationStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) | (_, Expired) => true,
            (Paused, Executing) => true,
            (Paused, _) => false,
            (_, Paused) => true,
            (Planning, Executing) => true,
            (Executing, Analyzing) => true,
            (Analyzing, Responding) => true,
            (Responding, Complete) => true,
            _ => false,
        }
    }

    /// The next stage in the normal forward progression, if any.
    pub fn next_stage(&self) -> Option<InvestigationStatus> {
        use InvestigationStatus::*;
        match self {
            Planning => Some(Executing),
            Executing => Some(Analyzing),
            Analyzing => Some(Responding),
            Responding => Some(Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Severity ranking used by policy conditions and alert context.
///
/// Ordinal: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a severity from a case-insensitive string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open context document attached to an investigation. Step executors and
/// feedback handlers append heterogeneous keys; a BTreeMap keeps
/// serialization stable.
pub type ContextDocument = BTreeMap<String, Value>;

/// A unit of work tracking automated processing of one security alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    /// Unique identifier.
    pub id: Uuid,
    /// The alert that triggered this investigation.
    pub alert_id: String,
    /// Optional case this investigation belongs to.
    pub case_id: Option<String>,
    /// Owning tenant.
    pub tenant_id: String,
    /// User who started the investigation.
    pub user_id: String,
    /// Current lifecycle status.
    pub status: InvestigationStatus,
    /// Priority from 1 (lowest) to 5 (highest).
    pub priority: u8,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline after which the investigation is expired.
    pub expires_at: DateTime<Utc>,
    /// Open document of arbitrary serializable values.
    pub context: ContextDocument,
    /// Set when the investigation reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Investigation {
    /// Creates a new investigation in the `Planning` state.
    pub fn new(
        alert_id: String,
        tenant_id: String,
        user_id: String,
        priority: u8,
        timeout_ms: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            alert_id,
            case_id: None,
            tenant_id,
            user_id,
            status: InvestigationStatus::Planning,
            priority: priority.clamp(1, 5),
            created_at: now,
            expires_at: now + ChronoDuration::milliseconds(timeout_ms as i64),
            context: ContextDocument::new(),
            completed_at: None,
        }
    }

    /// Applies a status transition, stamping `completed_at` on terminal
    /// states. Returns false if the transition is invalid.
    pub fn transition_to(&mut self, next: InvestigationStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Total configured duration from creation to deadline.
    pub fn total_duration(&self) -> ChronoDuration {
        self.expires_at - self.created_at
    }

    /// Merges keys into the open context document, overwriting existing
    /// entries.
    pub fn merge_context(&mut self, values: ContextDocument) {
        for (k, v) in values {
            self.context.insert(k, v);
        }
    }
}

/// Status of a single investigation step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Complete => "complete",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "running" => Some(StepStatus::Running),
            "complete" => Some(StepStatus::Complete),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }

    /// Counts toward progress when the step needs no further work.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            StepStatus::Complete | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// One recorded stage of an investigation, owned by an external agent
/// executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationStep {
    pub id: Uuid,
    pub investigation_id: Uuid,
    pub step_name: String,
    pub agent_type: String,
    pub status: StepStatus,
    /// Monotonic ordering key within the investigation.
    pub step_order: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub output_data: Option<Value>,
}

impl InvestigationStep {
    /// Creates a pending step.
    pub fn new(
        investigation_id: Uuid,
        step_name: String,
        agent_type: String,
        step_order: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            investigation_id,
            step_name,
            agent_type,
            status: StepStatus::Pending,
            step_order,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            output_data: None,
        }
    }

    /// Marks the step running.
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Marks the step complete with its output.
    pub fn complete(&mut self, output: Option<Value>) {
        self.status = StepStatus::Complete;
        self.completed_at = Some(Utc::now());
        self.output_data = output;
    }

    /// Marks the step failed with an error message.
    pub fn fail(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error);
    }
}

/// Human feedback appended to an investigation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanFeedback {
    pub investigation_id: Uuid,
    pub user_id: String,
    pub feedback_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HumanFeedback {
    pub fn new(
        investigation_id: Uuid,
        user_id: String,
        feedback_type: String,
        content: String,
    ) -> Self {
        Self {
            investigation_id,
            user_id,
            feedback_type,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Result of a tool invocation, appended to the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// Append-only record of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecutionRecord {
    pub id: Uuid,
    /// The approval that authorized this execution, if one was required.
    pub approval_request_id: Option<Uuid>,
    pub tool: String,
    pub request: Value,
    pub response: Option<Value>,
    pub status: ExecutionStatus,
    pub error_class: Option<String>,
    pub retries: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tenant_id: String,
}
