//! Error types for the caseflow core.
//!
//! The taxonomy distinguishes caller mistakes (validation, conflicts),
//! missing entities, policy refusals, and transient external failures that
//! the resilient executor may retry.

use thiserror::Error;

/// Shorthand for results produced by core components.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by core orchestration components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required field was missing or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A non-terminal investigation already exists for the alert/tenant pair.
    #[error("Duplicate investigation for alert '{alert_id}' in tenant '{tenant_id}'")]
    DuplicateInvestigation { alert_id: String, tenant_id: String },

    /// The operation conflicts with current state (e.g. resuming a
    /// non-paused investigation, or the kill switch is active).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The action was denied by policy.
    #[error("Action denied by policy: {0}")]
    PolicyDenied(String),

    /// A transient failure from an external system. Candidates for retry.
    #[error("Transient external error: {0}")]
    TransientExternal(String),

    /// A deadline elapsed. Drives asynchronous transitions to
    /// expired/failed rather than being surfaced synchronously.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A persistence operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Convenience constructor for validation failures about a missing field.
    pub fn missing_field(field: &str) -> Self {
        CoreError::Validation(format!("missing required field: {field}"))
    }

    /// Convenience constructor for lookups that came up empty.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}
