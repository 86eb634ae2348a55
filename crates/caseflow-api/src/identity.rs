//! Caller identity resolution for multi-tenant request handling.
//!
//! Authentication lives in front of this service; requests arrive with the
//! caller already identified through the `x-tenant-id` and `x-user-id`
//! headers. The extractor rejects requests missing either header.

use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the tenant identifier.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Header carrying the acting user identifier.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, resolved from request headers.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
}

fn header_value(parts: &Parts, name: &str) -> Result<String, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing required header: {name}")))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("invalid header value: {name}")))?;
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "missing required header: {name}"
        )));
    }
    Ok(value.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity {
            tenant_id: header_value(parts, TENANT_ID_HEADER)?,
            user_id: header_value(parts, USER_ID_HEADER)?,
        })
    }
}
