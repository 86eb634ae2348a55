//! Policy-gated action endpoints.
//!
//! Actions are evaluated against the tenant's policies: `allow` executes
//! immediately through the resilient executor, `require_approval` opens an
//! approval request, and `deny` is refused with an authorization error.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

use crate::dto::{ActionRequestBody, ActionResponse, ExecuteActionBody};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;
use caseflow_core::audit::{AuditEvent, AuditEventKind, AuditSink};
use caseflow_core::{Investigation, Severity};
use caseflow_policy::{ActionContext, PolicyEffect};

/// Creates action routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id/request", post(request_action))
        .route("/:id/execute", post(execute_action))
}

/// Derives the policy evaluation context from an investigation.
///
/// Step executors record `severity` and boolean `flags` keys in the
/// context document as they learn about the alert.
fn action_context(investigation: &Investigation) -> ActionContext {
    let mut ctx = ActionContext::default();
    ctx.severity = investigation
        .context
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse);
    if let Some(flags) = investigation.context.get("flags").and_then(Value::as_object) {
        for (key, value) in flags {
            if let Some(flag) = value.as_bool() {
                ctx.flags.insert(key.clone(), flag);
            }
        }
    }
    ctx
}

async fn load_investigation(
    state: &AppState,
    id: Uuid,
    tenant_id: &str,
) -> Result<Investigation, ApiError> {
    state
        .store
        .get_investigation(id, tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Investigation with id {id} not found")))
}

async fn run_action(
    state: &AppState,
    tenant_id: &str,
    approval_request_id: Option<Uuid>,
    action: &str,
    resource: &str,
    params: &Value,
) -> Result<Value, ApiError> {
    let request = json!({
        "action": action,
        "resource": resource,
        "params": params,
    });

    let dispatcher = state.dispatcher.clone();
    let owned_action = action.to_string();
    let owned_resource = resource.to_string();
    let owned_params = params.clone();

    let started = Instant::now();
    let result = state
        .executor
        .execute(action, tenant_id, approval_request_id, request, move || {
            let dispatcher = dispatcher.clone();
            let action = owned_action.clone();
            let resource = owned_resource.clone();
            let params = owned_params.clone();
            async move { dispatcher.dispatch(&action, &resource, &params).await }
        })
        .await;

    state
        .metrics
        .record_action_executed(action, result.is_ok(), started.elapsed().as_millis() as u64)
        .await;
    result.map_err(Into::into)
}

/// Request an action against an investigation's subject.
async fn request_action(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<ActionRequestBody>,
) -> Result<Json<ActionResponse>, ApiError> {
    if body.action.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "missing required field: action".to_string(),
        ));
    }
    let investigation = load_investigation(&state, id, &identity.tenant_id).await?;

    let resource = body.resource.as_deref().unwrap_or("*");
    let params = body.params.unwrap_or(Value::Null);
    let ctx = action_context(&investigation);
    let decision = state
        .policy
        .evaluate_action(&identity.tenant_id, &body.action, resource, &ctx)
        .await;
    state
        .metrics
        .record_policy_decision(decision.effect.as_str())
        .await;

    match decision.effect {
        PolicyEffect::Allow => {
            let result =
                run_action(&state, &identity.tenant_id, None, &body.action, resource, &params)
                    .await?;
            Ok(Json(ActionResponse {
                outcome: "executed".to_string(),
                effect: decision.effect,
                reason: decision.reason,
                risk: decision.risk,
                approval: None,
                result: Some(result),
            }))
        }
        PolicyEffect::RequireApproval => {
            let approval = state
                .approvals
                .submit_request(
                    &body.action,
                    resource,
                    &identity.user_id,
                    decision.risk,
                    decision.policy_id,
                )
                .await;
            state
                .metrics
                .record_pending_approvals(state.approvals.list_pending().await.len())
                .await;
            Ok(Json(ActionResponse {
                outcome: "approval_required".to_string(),
                effect: decision.effect,
                reason: decision.reason,
                risk: decision.risk,
                approval: Some(approval),
                result: None,
            }))
        }
        PolicyEffect::Deny => {
            state
                .audit
                .record(
                    AuditEvent::new(
                        AuditEventKind::Custom("action_denied".to_string()),
                        &identity.user_id,
                        format!("Action '{}' denied: {}", body.action, decision.reason),
                    )
                    .for_investigation(id)
                    .failed(),
                )
                .await;
            Err(ApiError::Forbidden(decision.reason))
        }
    }
}

/// Execute an action, either allowed outright or backed by a resolved
/// approval.
async fn execute_action(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<ExecuteActionBody>,
) -> Result<Json<ActionResponse>, ApiError> {
    if body.action.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "missing required field: action".to_string(),
        ));
    }
    let investigation = load_investigation(&state, id, &identity.tenant_id).await?;

    let resource = body.resource.as_deref().unwrap_or("*");
    let params = body.params.unwrap_or(Value::Null);

    if let Some(approval_id) = body.approval_request_id {
        let approval = state
            .approvals
            .get_request(approval_id)
            .await
            .ok_or_else(|| {
                ApiError::NotFound(format!("Approval request {approval_id} not found"))
            })?;
        if approval.action != body.action {
            return Err(ApiError::BadRequest(format!(
                "approval {approval_id} covers action '{}', not '{}'",
                approval.action, body.action
            )));
        }
        if !approval.authorizes_execution() {
            return Err(ApiError::Forbidden(format!(
                "approval {approval_id} does not authorize execution (status: {})",
                approval.status
            )));
        }

        let result = run_action(
            &state,
            &identity.tenant_id,
            Some(approval_id),
            &body.action,
            resource,
            &params,
        )
        .await?;
        return Ok(Json(ActionResponse {
            outcome: "executed".to_string(),
            effect: PolicyEffect::Allow,
            reason: format!("approved via request {approval_id}"),
            risk: approval.risk,
            approval: Some(approval),
            result: Some(result),
        }));
    }

    let ctx = action_context(&investigation);
    let decision = state
        .policy
        .evaluate_action(&identity.tenant_id, &body.action, resource, &ctx)
        .await;
    state
        .metrics
        .record_policy_decision(decision.effect.as_str())
        .await;

    match decision.effect {
        PolicyEffect::Allow => {
            let result =
                run_action(&state, &identity.tenant_id, None, &body.action, resource, &params)
                    .await?;
            Ok(Json(ActionResponse {
                outcome: "executed".to_string(),
                effect: decision.effect,
                reason: decision.reason,
                risk: decision.risk,
                approval: None,
                result: Some(result),
            }))
        }
        PolicyEffect::RequireApproval => Err(ApiError::Forbidden(format!(
            "action requires approval: {}",
            decision.reason
        ))),
        PolicyEffect::Deny => Err(ApiError::Forbidden(decision.reason)),
    }
}
