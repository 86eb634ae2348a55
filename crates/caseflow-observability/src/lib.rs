//! # caseflow-observability
//!
//! Logging, audit trail, and metrics collection for Caseflow.
//!
//! This crate provides structured logging via the tracing ecosystem, a
//! bounded in-memory audit log implementing the core sink traits, and a
//! buffered in-memory metrics collector.

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditLog, AuditLogEntry};
pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::{DurationStats, MetricsCollector, MetricsSummary};
