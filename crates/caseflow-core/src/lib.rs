//! # caseflow-core
//!
//! Core orchestration substrate for Caseflow.
//!
//! This crate provides the investigation lifecycle state machine, the
//! deadline and resource manager, the resilient execution helpers, the
//! rate limiting primitives, and the storage seam the rest of the
//! workspace builds on.

pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod rate_limit;
pub mod store;
pub mod timeout;
pub mod types;

pub use audit::{AuditEvent, AuditEventKind, AuditSink, NoopAudit};
pub use config::{
    MetricsConfig, OrchestratorConfig, ResourceLimits, RetryConfig, TimeoutConfig,
};
pub use error::{CoreError, CoreResult};
pub use executor::{
    classify_error, classify_message, parallel_map, with_retry, ActionAuditSink,
    ActionDispatcher, ErrorClass, NoopActionAudit, ToolExecutor,
};
pub use orchestrator::{
    AlertLookup, AllowAllAlerts, Orchestrator, OrchestratorStats, StartOptions, StatusReport,
};
pub use rate_limit::{
    CompositeLimiter, FixedWindow, LimiterStatus, RateLimit, SlidingWindow, TokenBucket,
};
pub use store::{InMemoryStore, InvestigationFilter, InvestigationStats, InvestigationStore};
pub use timeout::{
    ResourceCheck, ResourceUsage, ResourceUsageUpdate, TimeoutHandler, TimeoutManager,
    TimeoutRecord, TimeoutStats, TimeoutStatus,
};
pub use types::{
    ActionExecutionRecord, ContextDocument, ExecutionStatus, HumanFeedback, Investigation,
    InvestigationStatus, InvestigationStep, Severity, StepStatus,
};
