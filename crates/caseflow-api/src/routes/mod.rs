//! Route definitions and router assembly.

pub mod actions;
pub mod approvals;
pub mod investigations;
pub mod system;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::identity::TENANT_ID_HEADER;
use crate::state::AppState;

/// Paths that bypass rate limiting.
const BYPASS_PATHS: &[&str] = &["/health"];

/// Rejects requests over the per-client or global rate limit.
async fn rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if BYPASS_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let client = request
        .headers()
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    if state.rate_limiter.check(&client).is_err() {
        state.metrics.record_rate_limited("api").await;
        return ApiError::RateLimitExceeded.into_response();
    }

    next.run(request).await
}

/// Builds the application router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/investigations", investigations::routes())
        .nest("/actions", actions::routes())
        .nest("/approvals", approvals::routes())
        .merge(system::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
