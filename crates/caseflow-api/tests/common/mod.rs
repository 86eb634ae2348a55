//! Common test utilities for API integration tests.
//!
//! Builds a fully wired in-process application: in-memory store, timeout
//! manager, orchestrator, policy engine with the default policy set,
//! approval manager, and a connector registry holding one memory
//! connector that dispatched actions route through.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use caseflow_api::{build_router, ApiRateLimiter, AppState, RegistryDispatcher};
use caseflow_connectors::{
    ConnectorConfig, ConnectorRegistry, ConnectorType, MemoryConnectorFactory,
};
use caseflow_core::{
    AllowAllAlerts, InMemoryStore, Orchestrator, OrchestratorConfig, ResourceLimits,
    TimeoutConfig, TimeoutManager,
};
use caseflow_observability::{AuditLog, MetricsCollector};
use caseflow_policy::{ApprovalManager, PolicyEngine};

pub const TENANT: &str = "tenant-1";
pub const ANALYST: &str = "analyst-1";

/// Builds the full application state against in-memory components.
pub async fn setup_state() -> AppState {
    let store = Arc::new(InMemoryStore::new());
    let timeouts = Arc::new(TimeoutManager::new(
        TimeoutConfig::default(),
        ResourceLimits::default(),
    ));
    let audit = Arc::new(AuditLog::without_tracing(256));

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        store.clone(),
        timeouts.clone(),
        audit.clone(),
        Arc::new(AllowAllAlerts),
    );
    orchestrator.install_timeout_handler().await;

    let registry = Arc::new(ConnectorRegistry::new());
    registry
        .register_factory(Arc::new(MemoryConnectorFactory))
        .await;
    registry
        .register(ConnectorConfig::new(
            "default",
            ConnectorType::Memory,
            TENANT,
        ))
        .await
        .expect("memory connector should register");
    let dispatcher = Arc::new(RegistryDispatcher::new(registry.clone(), "default"));

    AppState::new(
        orchestrator,
        store,
        Arc::new(PolicyEngine::new()),
        Arc::new(ApprovalManager::new(3600)),
        dispatcher,
        registry,
        audit,
        Arc::new(MetricsCollector::default()),
    )
}

/// Builds the router over a freshly wired state.
pub async fn setup_app() -> Router {
    build_router(setup_state().await)
}

/// Builds the router with a custom rate limiter.
pub async fn setup_app_with_limiter(limiter: ApiRateLimiter) -> Router {
    build_router(setup_state().await.with_rate_limiter(limiter))
}

/// GET request with the default test identity headers.
pub fn get_request(uri: &str) -> Request<Body> {
    get_request_as(uri, ANALYST)
}

/// GET request with a caller-supplied user id.
pub fn get_request_as(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-tenant-id", TENANT)
        .header("x-user-id", user_id)
        .body(Body::empty())
        .expect("request should build")
}

/// POST request with a JSON body and the default test identity headers.
pub fn post_json_request(uri: &str, body: Value) -> Request<Body> {
    post_json_request_as(uri, ANALYST, body)
}

/// POST request with a JSON body and a caller-supplied user id.
pub fn post_json_request_as(uri: &str, user_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-tenant-id", TENANT)
        .header("x-user-id", user_id)
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

/// Sends a request and parses the JSON response body.
pub async fn send_request<T: DeserializeOwned>(app: Router, request: Request<Body>) -> (StatusCode, T) {
    let response = app.oneshot(request).await.expect("request should not fail");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    let parsed = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "failed to parse response body ({}): {}",
            e,
            String::from_utf8_lossy(&bytes)
        )
    });
    (status, parsed)
}

/// Sends a request and returns only the status code.
pub async fn send_request_raw(app: Router, request: Request<Body>) -> StatusCode {
    let response = app.oneshot(request).await.expect("request should not fail");
    response.status()
}

/// Starts an investigation through the API and returns its id.
pub async fn start_investigation(app: &Router, alert_id: &str) -> String {
    let (status, body) = send_request::<Value>(
        app.clone(),
        post_json_request(
            "/investigations/start",
            serde_json::json!({ "alert_id": alert_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["investigation"]["id"]
        .as_str()
        .expect("investigation id should be present")
        .to_string()
}
