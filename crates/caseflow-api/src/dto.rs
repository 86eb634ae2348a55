//! Request and response types for the HTTP API.

use caseflow_core::{Investigation, InvestigationStats, StatusReport};
use caseflow_policy::{ApprovalRequest, PolicyEffect, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body for `POST /investigations/start`.
#[derive(Debug, Deserialize)]
pub struct StartInvestigationRequest {
    pub alert_id: String,
    pub priority: Option<u8>,
    pub timeout_ms: Option<u64>,
}

/// Response for a newly started investigation.
#[derive(Debug, Serialize)]
pub struct InvestigationCreatedResponse {
    pub investigation: Investigation,
}

/// Response for `GET /investigations/:id/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: StatusReport,
}

/// One event on an investigation's timeline.
#[derive(Debug, Serialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    /// `step` or `feedback`.
    pub kind: String,
    pub label: String,
    pub detail: Option<String>,
}

/// Response for `GET /investigations/:id/timeline`.
#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub investigation_id: Uuid,
    pub status: String,
    pub progress: f64,
    pub timeline: Vec<TimelineEntry>,
}

/// Body for `POST /investigations/:id/feedback`.
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback_type: Option<String>,
    pub content: String,
}

/// Generic acknowledgement response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Query parameters for `GET /investigations`.
#[derive(Debug, Default, Deserialize)]
pub struct ListInvestigationsQuery {
    pub status: Option<String>,
    pub priority: Option<u8>,
    pub alert_id: Option<String>,
    pub case_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Paginated investigation listing.
#[derive(Debug, Serialize)]
pub struct InvestigationListResponse {
    pub investigations: Vec<Investigation>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Query parameters for `GET /investigations/stats`.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub timeframe: Option<String>,
}

/// Response for `GET /investigations/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub timeframe: String,
    #[serde(flatten)]
    pub stats: InvestigationStats,
}

/// Body for `POST /actions/:id/request`.
#[derive(Debug, Deserialize)]
pub struct ActionRequestBody {
    pub action: String,
    pub resource: Option<String>,
    pub params: Option<Value>,
    pub reason: Option<String>,
}

/// Body for `POST /actions/:id/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteActionBody {
    pub action: String,
    pub resource: Option<String>,
    pub params: Option<Value>,
    pub approval_request_id: Option<Uuid>,
}

/// Outcome of a policy-gated action request.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    /// `executed` or `approval_required`.
    pub outcome: String,
    pub effect: PolicyEffect,
    pub reason: String,
    pub risk: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Body for `POST /approvals/:id/approve`.
#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
    pub comment: Option<String>,
}

/// Body for `POST /approvals/:id/deny`.
#[derive(Debug, Default, Deserialize)]
pub struct DenyBody {
    pub reason: Option<String>,
}

/// Response for `GET /approvals`.
#[derive(Debug, Serialize)]
pub struct ApprovalListResponse {
    pub approvals: Vec<ApprovalRequest>,
}

/// Response for a single approval request.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub approval: ApprovalRequest,
}

/// Response for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_investigations: usize,
    pub registered_connectors: usize,
    pub kill_switch_active: bool,
}
