//! # caseflow-api
//!
//! HTTP surface for investigation orchestration and action approvals.
//!
//! The API exposes investigation lifecycle operations, policy-gated
//! action execution with an approval workflow, and system health and
//! metrics endpoints. Callers are identified through `x-tenant-id` and
//! `x-user-id` headers; authentication lives in front of this service.

pub mod dispatch;
pub mod dto;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

pub use dispatch::RegistryDispatcher;
pub use error::{ApiError, ErrorBody, ErrorEnvelope};
pub use identity::{Identity, TENANT_ID_HEADER, USER_ID_HEADER};
pub use rate_limit::ApiRateLimiter;
pub use routes::build_router;
pub use server::serve;
pub use state::AppState;
