//! Health and metrics endpoints.

use axum::{extract::State, routing::get, Json, Router};

use crate::dto::HealthResponse;
use crate::state::AppState;
use caseflow_observability::MetricsSummary;

/// Creates system routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics/summary", get(metrics_summary))
}

/// Service liveness and composition overview.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_investigations: state.orchestrator.active_count().await,
        registered_connectors: state.registry.len().await,
        kill_switch_active: state.orchestrator.kill_switch_active().await,
    })
}

/// Snapshot of the in-memory metrics aggregates.
async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.snapshot().await)
}
