//! Application state shared across handlers.

use crate::rate_limit::ApiRateLimiter;
use caseflow_connectors::ConnectorRegistry;
use caseflow_core::{
    ActionDispatcher, InvestigationStore, Orchestrator, RetryConfig, ToolExecutor,
};
use caseflow_observability::{AuditLog, MetricsCollector};
use caseflow_policy::{ApprovalManager, PolicyEngine};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Investigation lifecycle orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Persistence for investigations, steps, and feedback.
    pub store: Arc<dyn InvestigationStore>,
    /// Policy engine deciding action effects.
    pub policy: Arc<PolicyEngine>,
    /// Approval workflow manager.
    pub approvals: Arc<ApprovalManager>,
    /// Retry-wrapping action executor.
    pub executor: Arc<ToolExecutor>,
    /// Dispatches approved actions to external systems.
    pub dispatcher: Arc<dyn ActionDispatcher>,
    /// Connector registry backing dispatch and health reporting.
    pub registry: Arc<ConnectorRegistry>,
    /// Audit trail, also serving recorded action executions.
    pub audit: Arc<AuditLog>,
    /// In-memory metrics aggregates.
    pub metrics: Arc<MetricsCollector>,
    /// Per-client request limiter.
    pub rate_limiter: ApiRateLimiter,
}

impl AppState {
    /// Creates application state from pre-wired components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn InvestigationStore>,
        policy: Arc<PolicyEngine>,
        approvals: Arc<ApprovalManager>,
        dispatcher: Arc<dyn ActionDispatcher>,
        registry: Arc<ConnectorRegistry>,
        audit: Arc<AuditLog>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let executor = Arc::new(ToolExecutor::new(RetryConfig::default(), audit.clone()));
        Self {
            orchestrator,
            store,
            policy,
            approvals,
            executor,
            dispatcher,
            registry,
            audit,
            metrics,
            rate_limiter: ApiRateLimiter::new(),
        }
    }

    /// Replaces the default rate limiter.
    pub fn with_rate_limiter(mut self, limiter: ApiRateLimiter) -> Self {
        self.rate_limiter = limiter;
        self
    }
}
