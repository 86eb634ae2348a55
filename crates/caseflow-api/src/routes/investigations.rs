//! Investigation lifecycle endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::dto::{
    FeedbackRequest, InvestigationCreatedResponse, InvestigationListResponse,
    ListInvestigationsQuery, StartInvestigationRequest, StatsQuery, StatsResponse, StatusResponse,
    SuccessResponse, TimelineEntry, TimelineResponse,
};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;
use caseflow_core::{InvestigationFilter, InvestigationStatus, StartOptions};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

/// Creates investigation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_investigations))
        .route("/start", post(start_investigation))
        .route("/stats", get(investigation_stats))
        .route("/:id/status", get(investigation_status))
        .route("/:id/timeline", get(investigation_timeline))
        .route("/:id/feedback", post(add_feedback))
        .route("/:id/pause", post(pause_investigation))
        .route("/:id/resume", post(resume_investigation))
}

/// Start a new investigation for an alert.
async fn start_investigation(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<StartInvestigationRequest>,
) -> Result<(StatusCode, Json<InvestigationCreatedResponse>), ApiError> {
    let options = StartOptions {
        user_id: identity.user_id,
        tenant_id: identity.tenant_id.clone(),
        priority: body.priority,
        timeout_ms: body.timeout_ms,
    };

    let investigation = state
        .orchestrator
        .start_investigation(&body.alert_id, options)
        .await?;

    state
        .metrics
        .record_investigation_started(&identity.tenant_id)
        .await;
    state
        .metrics
        .record_active_investigations(state.orchestrator.active_count().await)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(InvestigationCreatedResponse { investigation }),
    ))
}

/// Get the status report for an investigation.
async fn investigation_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .orchestrator
        .get_investigation_status(id, &identity.tenant_id)
        .await?;
    Ok(Json(StatusResponse { status }))
}

/// Get the merged step/feedback timeline for an investigation.
async fn investigation_timeline(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let report = state
        .orchestrator
        .get_investigation_status(id, &identity.tenant_id)
        .await?;
    let feedback = state.store.list_feedback(id).await?;

    let created_at = report.investigation.created_at;
    let mut timeline: Vec<TimelineEntry> = report
        .steps
        .iter()
        .map(|step| TimelineEntry {
            at: step.completed_at.or(step.started_at).unwrap_or(created_at),
            kind: "step".to_string(),
            label: format!("{} ({})", step.step_name, step.status),
            detail: step.error_message.clone(),
        })
        .collect();
    timeline.extend(feedback.iter().map(|f| TimelineEntry {
        at: f.created_at,
        kind: "feedback".to_string(),
        label: f.feedback_type.clone(),
        detail: Some(f.content.clone()),
    }));
    timeline.sort_by_key(|e| e.at);

    Ok(Json(TimelineResponse {
        investigation_id: id,
        status: report.investigation.status.to_string(),
        progress: report.progress,
        timeline,
    }))
}

/// Attach human feedback to an investigation.
async fn add_feedback(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let feedback_type = body.feedback_type.as_deref().unwrap_or("comment");
    state
        .orchestrator
        .add_human_feedback(
            id,
            feedback_type,
            &body.content,
            &identity.user_id,
            &identity.tenant_id,
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Pause an active investigation.
async fn pause_investigation(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .orchestrator
        .pause_investigation(id, &identity.user_id, &identity.tenant_id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Resume a paused investigation.
async fn resume_investigation(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .orchestrator
        .resume_investigation(id, &identity.user_id, &identity.tenant_id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// List investigations with filtering and pagination.
async fn list_investigations(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListInvestigationsQuery>,
) -> Result<Json<InvestigationListResponse>, ApiError> {
    let status = match &query.status {
        Some(s) => Some(InvestigationStatus::from_db_str(s).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown investigation status: {s}"))
        })?),
        None => None,
    };

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let filter = InvestigationFilter {
        tenant_id: Some(identity.tenant_id),
        status,
        priority: query.priority,
        alert_id: query.alert_id,
        case_id: query.case_id,
        limit,
        offset: query.offset.unwrap_or(0),
    };

    let (investigations, total) = state.store.list_investigations(&filter).await?;
    Ok(Json(InvestigationListResponse {
        investigations,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Aggregate investigation statistics over a timeframe.
async fn investigation_stats(
    State(state): State<AppState>,
    _identity: Identity,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let timeframe = query.timeframe.as_deref().unwrap_or("7d");
    let days = match timeframe {
        "1d" => 1,
        "7d" => 7,
        "30d" => 30,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown timeframe '{other}', expected 1d, 7d, or 30d"
            )))
        }
    };

    let stats = state.store.stats_since(Utc::now() - Duration::days(days)).await?;
    Ok(Json(StatsResponse {
        timeframe: timeframe.to_string(),
        stats,
    }))
}
