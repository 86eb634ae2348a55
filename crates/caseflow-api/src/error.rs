//! Error responses for the HTTP surface.
//!
//! Core and policy errors map onto a stable JSON envelope
//! `{error: {code, message, request_id}}` with matching status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use caseflow_core::CoreError;
use caseflow_policy::ApprovalError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by request handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No such resource within the caller's tenant.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or invalid request payload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The caller is identified but not allowed to do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate resource or invalid state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller exceeded a request quota.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Unexpected failure inside the service.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error envelope body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Inner error payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Message suitable for display.
    pub message: String,
    /// Correlates the response with server logs.
    pub request_id: String,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
                request_id: Uuid::new_v4().to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} with id {id} not found"))
            }
            CoreError::DuplicateInvestigation { .. } => ApiError::Conflict(err.to_string()),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::PolicyDenied(msg) => ApiError::Forbidden(msg),
            err => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound(id) => {
                ApiError::NotFound(format!("Approval request {id} not found"))
            }
            ApprovalError::AlreadyDecided => ApiError::Conflict(err.to_string()),
            ApprovalError::Expired => ApiError::Conflict(err.to_string()),
            ApprovalError::SegregationOfDuties(msg) => ApiError::Forbidden(msg),
        }
    }
}
