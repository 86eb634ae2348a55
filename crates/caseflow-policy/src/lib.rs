//! # caseflow-policy
//!
//! Policy engine and approval workflow for Caseflow.
//!
//! This crate decides whether proposed actions may run automatically,
//! are refused, or must wait for a human approval with segregation of
//! duties enforced at resolution time.

pub mod approval;
pub mod engine;

pub use approval::{
    check_segregation_of_duties, ApprovalError, ApprovalManager, ApprovalRequest, ApprovalStatus,
    SodCheck,
};
pub use engine::{
    glob_match, ActionContext, Policy, PolicyConditions, PolicyDecision, PolicyEffect,
    PolicyEngine, PolicyError, RiskLevel,
};
