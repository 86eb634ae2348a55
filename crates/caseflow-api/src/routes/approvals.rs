//! Approval workflow endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::{ApprovalListResponse, ApprovalResponse, ApproveBody, DenyBody};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

/// Creates approval routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_approvals))
        .route("/:id", get(get_approval))
        .route("/:id/approve", post(approve))
        .route("/:id/deny", post(deny))
}

/// List pending approval requests.
async fn list_approvals(
    State(state): State<AppState>,
    _identity: Identity,
) -> Json<ApprovalListResponse> {
    Json(ApprovalListResponse {
        approvals: state.approvals.list_pending().await,
    })
}

/// Get a single approval request.
async fn get_approval(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let approval = state
        .approvals
        .get_request(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Approval request {id} not found")))?;
    Ok(Json(ApprovalResponse { approval }))
}

/// Approve a pending request. Segregation of duties is enforced here: the
/// requestor cannot approve their own request.
async fn approve(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveBody>>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let comment = body.as_ref().and_then(|b| b.comment.as_deref());
    let approval = state
        .approvals
        .approve(id, &identity.user_id, comment)
        .await?;
    state
        .metrics
        .record_pending_approvals(state.approvals.list_pending().await.len())
        .await;
    Ok(Json(ApprovalResponse { approval }))
}

/// Deny a pending request, subject to the same lifecycle and segregation
/// checks as approval.
async fn deny(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Option<Json<DenyBody>>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let reason = body
        .as_ref()
        .and_then(|b| b.reason.as_deref())
        .unwrap_or("denied by approver");
    let approval = state.approvals.deny(id, &identity.user_id, reason).await?;
    state
        .metrics
        .record_pending_approvals(state.approvals.list_pending().await.len())
        .await;
    Ok(Json(ApprovalResponse { approval }))
}
