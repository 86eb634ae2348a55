//! Policy evaluation engine for Caseflow.
//!
//! This module implements first-match-wins evaluation of per-owner policy
//! lists. A policy matches when its action glob, resource glob, and
//! structured conditions all match the proposed action; the first match in
//! insertion order decides the outcome.

use caseflow_core::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors that can occur in policy management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Policy not found for the owner.
    #[error("Policy not found: {0}")]
    NotFound(Uuid),

    /// Policy definition is invalid.
    #[error("Invalid policy: {0}")]
    Invalid(String),
}

/// Effect a policy applies to matching actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Action may proceed automatically.
    Allow,
    /// Action is refused outright.
    Deny,
    /// Action needs a resolved approval before it may proceed.
    RequireApproval,
}

impl PolicyEffect {
    /// Returns the snake_case string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyEffect::Allow => "allow",
            PolicyEffect::Deny => "deny",
            PolicyEffect::RequireApproval => "require_approval",
        }
    }
}

impl std::fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk classification attached to a policy and carried into decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured predicate evaluated against an [`ActionContext`].
///
/// All configured parts must hold for the conditions to match. A flag
/// absent from the context is treated as false.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyConditions {
    /// Boolean flags that must equal the context's values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub flags: HashMap<String, bool>,
    /// Context severity must be at or above this bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<Severity>,
    /// Context severity must be at or below this bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_severity: Option<Severity>,
}

impl PolicyConditions {
    /// Returns true when every configured condition holds for the context.
    pub fn matches(&self, context: &ActionContext) -> bool {
        for (flag, expected) in &self.flags {
            let actual = context.flags.get(flag).copied().unwrap_or(false);
            if actual != *expected {
                return false;
            }
        }

        if self.min_severity.is_some() || self.max_severity.is_some() {
            let severity = match context.severity {
                Some(s) => s,
                None => return false,
            };
            if let Some(min) = self.min_severity {
                if severity < min {
                    return false;
                }
            }
            if let Some(max) = self.max_severity {
                if severity > max {
                    return false;
                }
            }
        }

        true
    }
}

/// Context for evaluating a proposed action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    /// Severity of the investigation driving the action.
    pub severity: Option<Severity>,
    /// Boolean facts about the principal and target.
    pub flags: HashMap<String, bool>,
    /// Additional context data, not consulted by conditions.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ActionContext {
    pub fn with_severity(severity: Severity) -> Self {
        Self {
            severity: Some(severity),
            ..Default::default()
        }
    }

    pub fn flag(mut self, name: &str, value: bool) -> Self {
        self.flags.insert(name.to_string(), value);
        self
    }
}

/// One declarative policy in an owner's ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Unique identifier for the policy.
    pub id: Uuid,
    /// Human-readable name, used as the decision reason.
    pub name: String,
    /// Glob matched against the action name.
    pub action_pattern: String,
    /// Glob matched against the resource identifier.
    pub resource_pattern: String,
    /// Structured conditions over the action context.
    pub conditions: PolicyConditions,
    /// Effect applied when the policy matches.
    pub effect: PolicyEffect,
    /// Risk classification carried into the decision.
    pub risk: RiskLevel,
    /// When the policy was created.
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Creates a policy matching any resource with no extra conditions.
    pub fn new(name: &str, action_pattern: &str, effect: PolicyEffect, risk: RiskLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            action_pattern: action_pattern.to_string(),
            resource_pattern: "*".to_string(),
            conditions: PolicyConditions::default(),
            effect,
            risk,
            created_at: Utc::now(),
        }
    }

    pub fn for_resource(mut self, resource_pattern: &str) -> Self {
        self.resource_pattern = resource_pattern.to_string();
        self
    }

    pub fn with_conditions(mut self, conditions: PolicyConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Returns true when the policy matches the proposed action.
    pub fn matches(&self, action: &str, resource: &str, context: &ActionContext) -> bool {
        glob_match(&self.action_pattern, action)
            && glob_match(&self.resource_pattern, resource)
            && self.conditions.matches(context)
    }
}

/// Outcome of evaluating an action against an owner's policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Effect to apply.
    pub effect: PolicyEffect,
    /// Name of the deciding policy, or `"Default"` when none matched.
    pub reason: String,
    /// Risk carried from the deciding policy.
    pub risk: RiskLevel,
    /// Identifier of the deciding policy, if any.
    pub policy_id: Option<Uuid>,
}

/// Matches a glob pattern supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = input.chars().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = si;
            pi += 1;
        } else if let Some(star_pos) = star {
            pi = star_pos + 1;
            mark += 1;
            si = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// The policy engine holds per-owner ordered policy lists and evaluates
/// proposed actions against them.
pub struct PolicyEngine {
    /// Ordered policies keyed by owner.
    policies: Arc<RwLock<HashMap<String, Vec<Policy>>>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Builds the default policy set installed for owners with no
    /// configured policies.
    pub fn default_policies() -> Vec<Policy> {
        vec![
            Policy::new(
                "deny_destructive_delete",
                "delete_*",
                PolicyEffect::Deny,
                RiskLevel::Critical,
            ),
            Policy::new(
                "deny_destructive_wipe",
                "wipe_*",
                PolicyEffect::Deny,
                RiskLevel::Critical,
            ),
            Policy::new(
                "privileged_principal_approval",
                "*",
                PolicyEffect::RequireApproval,
                RiskLevel::High,
            )
            .with_conditions(PolicyConditions {
                flags: HashMap::from([("privileged".to_string(), true)]),
                min_severity: None,
                max_severity: None,
            }),
            Policy::new(
                "high_severity_approval",
                "*",
                PolicyEffect::RequireApproval,
                RiskLevel::High,
            )
            .with_conditions(PolicyConditions {
                flags: HashMap::new(),
                min_severity: Some(Severity::High),
                max_severity: None,
            }),
            Policy::new(
                "allow_read_only_get",
                "get_*",
                PolicyEffect::Allow,
                RiskLevel::Low,
            ),
            Policy::new(
                "allow_read_only_list",
                "list_*",
                PolicyEffect::Allow,
                RiskLevel::Low,
            ),
            Policy::new(
                "allow_ticketing",
                "create_ticket",
                PolicyEffect::Allow,
                RiskLevel::Low,
            ),
        ]
    }

    /// Evaluates a proposed action against the owner's policies.
    ///
    /// Owners with no configured policies get the default set installed
    /// on first evaluation. Policies are scanned in insertion order and
    /// the first match wins; with no match the decision is
    /// `RequireApproval` with reason `"Default"`.
    #[instrument(skip(self, context), fields(owner = %owner_id, action = %action))]
    pub async fn evaluate_action(
        &self,
        owner_id: &str,
        action: &str,
        resource: &str,
        context: &ActionContext,
    ) -> PolicyDecision {
        self.ensure_owner(owner_id).await;

        let policies = self.policies.read().await;
        let owned = policies.get(owner_id).map(Vec::as_slice).unwrap_or(&[]);

        for policy in owned {
            if policy.matches(action, resource, context) {
                debug!(policy = %policy.name, effect = ?policy.effect, "Policy matched");
                return PolicyDecision {
                    effect: policy.effect,
                    reason: policy.name.clone(),
                    risk: policy.risk,
                    policy_id: Some(policy.id),
                };
            }
        }

        debug!("No policy matched, requiring approval by default");
        PolicyDecision {
            effect: PolicyEffect::RequireApproval,
            reason: "Default".to_string(),
            risk: RiskLevel::Medium,
            policy_id: None,
        }
    }

    /// Appends a policy to the owner's list.
    pub async fn add_policy(&self, owner_id: &str, policy: Policy) {
        let mut policies = self.policies.write().await;
        policies
            .entry(owner_id.to_string())
            .or_default()
            .push(policy);
        info!(owner = %owner_id, "Policy added");
    }

    /// Replaces the owner's list wholesale, preserving the given order.
    pub async fn set_policies(&self, owner_id: &str, owned: Vec<Policy>) {
        let mut policies = self.policies.write().await;
        policies.insert(owner_id.to_string(), owned);
    }

    /// Removes a policy by id from the owner's list.
    pub async fn remove_policy(&self, owner_id: &str, policy_id: Uuid) -> Result<(), PolicyError> {
        let mut policies = self.policies.write().await;
        let owned = policies
            .get_mut(owner_id)
            .ok_or(PolicyError::NotFound(policy_id))?;
        let before = owned.len();
        owned.retain(|p| p.id != policy_id);
        if owned.len() == before {
            return Err(PolicyError::NotFound(policy_id));
        }
        info!(owner = %owner_id, policy_id = %policy_id, "Policy removed");
        Ok(())
    }

    /// Lists the owner's policies in insertion order, installing the
    /// defaults first if the owner has none.
    pub async fn list_policies(&self, owner_id: &str) -> Vec<Policy> {
        self.ensure_owner(owner_id).await;
        let policies = self.policies.read().await;
        policies.get(owner_id).cloned().unwrap_or_default()
    }

    async fn ensure_owner(&self, owner_id: &str) {
        {
            let policies = self.policies.read().await;
            if policies.contains_key(owner_id) {
                return;
            }
        }
        let mut policies = self.policies.write().await;
        if !policies.contains_key(owner_id) {
            debug!(owner = %owner_id, "Installing default policy set");
            policies.insert(owner_id.to_string(), Self::default_policies());
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("disable_*", "disable_account"));
        assert!(!glob_match("disable_*", "enable_account"));
        assert!(glob_match("get_?", "get_x"));
        assert!(!glob_match("get_?", "get_xy"));
        assert!(glob_match("*-prod-*", "web-prod-01"));
        assert!(!glob_match("*-prod-*", "web-dev-01"));
        assert!(glob_match("", ""));
        assert!(!glob_match("", "a"));
        assert!(glob_match("**", "abc"));
    }

    #[tokio::test]
    async fn test_first_match_wins_order_sensitive() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-1",
                vec![
                    Policy::new("deny_disable", "disable_*", PolicyEffect::Deny, RiskLevel::High),
                    Policy::new("allow_all", "*", PolicyEffect::Allow, RiskLevel::Low),
                ],
            )
            .await;

        let ctx = ActionContext::default();
        let decision = engine
            .evaluate_action("owner-1", "disable_account", "user-7", &ctx)
            .await;
        assert_eq!(decision.effect, PolicyEffect::Deny);
        assert_eq!(decision.reason, "deny_disable");

        let decision = engine
            .evaluate_action("owner-1", "create_ticket", "ticket-1", &ctx)
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);
        assert_eq!(decision.reason, "allow_all");
    }

    #[tokio::test]
    async fn test_default_decision_when_nothing_matches() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-1",
                vec![Policy::new(
                    "deny_disable",
                    "disable_*",
                    PolicyEffect::Deny,
                    RiskLevel::High,
                )],
            )
            .await;

        let decision = engine
            .evaluate_action("owner-1", "restart_service", "svc-1", &ActionContext::default())
            .await;
        assert_eq!(decision.effect, PolicyEffect::RequireApproval);
        assert_eq!(decision.reason, "Default");
        assert!(decision.policy_id.is_none());
    }

    #[tokio::test]
    async fn test_lazy_default_install_for_unseen_owner() {
        let engine = PolicyEngine::new();

        let decision = engine
            .evaluate_action(
                "fresh-owner",
                "delete_everything",
                "db-1",
                &ActionContext::default(),
            )
            .await;
        assert_eq!(decision.effect, PolicyEffect::Deny);

        let policies = engine.list_policies("fresh-owner").await;
        assert_eq!(policies.len(), PolicyEngine::default_policies().len());
    }

    #[tokio::test]
    async fn test_resource_pattern_restricts_match() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-1",
                vec![
                    Policy::new("deny_prod", "*", PolicyEffect::Deny, RiskLevel::Critical)
                        .for_resource("*-prod-*"),
                    Policy::new("allow_rest", "*", PolicyEffect::Allow, RiskLevel::Low),
                ],
            )
            .await;

        let ctx = ActionContext::default();
        let decision = engine
            .evaluate_action("owner-1", "restart_service", "web-prod-01", &ctx)
            .await;
        assert_eq!(decision.effect, PolicyEffect::Deny);

        let decision = engine
            .evaluate_action("owner-1", "restart_service", "web-dev-01", &ctx)
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);
    }

    #[tokio::test]
    async fn test_severity_bound_condition() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-1",
                vec![
                    Policy::new(
                        "escalate_high",
                        "*",
                        PolicyEffect::RequireApproval,
                        RiskLevel::High,
                    )
                    .with_conditions(PolicyConditions {
                        flags: HashMap::new(),
                        min_severity: Some(Severity::High),
                        max_severity: None,
                    }),
                    Policy::new("allow_rest", "*", PolicyEffect::Allow, RiskLevel::Low),
                ],
            )
            .await;

        let decision = engine
            .evaluate_action(
                "owner-1",
                "isolate_host",
                "host-1",
                &ActionContext::with_severity(Severity::Critical),
            )
            .await;
        assert_eq!(decision.effect, PolicyEffect::RequireApproval);

        let decision = engine
            .evaluate_action(
                "owner-1",
                "isolate_host",
                "host-1",
                &ActionContext::with_severity(Severity::Low),
            )
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);

        // No severity in context cannot satisfy a severity bound.
        let decision = engine
            .evaluate_action("owner-1", "isolate_host", "host-1", &ActionContext::default())
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);
    }

    #[tokio::test]
    async fn test_flag_condition() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-1",
                vec![
                    Policy::new(
                        "privileged_gate",
                        "*",
                        PolicyEffect::RequireApproval,
                        RiskLevel::High,
                    )
                    .with_conditions(PolicyConditions {
                        flags: HashMap::from([("privileged".to_string(), true)]),
                        min_severity: None,
                        max_severity: None,
                    }),
                    Policy::new("allow_rest", "*", PolicyEffect::Allow, RiskLevel::Low),
                ],
            )
            .await;

        let decision = engine
            .evaluate_action(
                "owner-1",
                "reset_password",
                "user-1",
                &ActionContext::default().flag("privileged", true),
            )
            .await;
        assert_eq!(decision.effect, PolicyEffect::RequireApproval);

        // Absent flag is treated as false.
        let decision = engine
            .evaluate_action("owner-1", "reset_password", "user-1", &ActionContext::default())
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);
    }

    #[tokio::test]
    async fn test_add_remove_list_policies() {
        let engine = PolicyEngine::new();
        engine.set_policies("owner-1", vec![]).await;

        let first = Policy::new("first", "a_*", PolicyEffect::Allow, RiskLevel::Low);
        let second = Policy::new("second", "b_*", PolicyEffect::Deny, RiskLevel::High);
        let second_id = second.id;
        engine.add_policy("owner-1", first).await;
        engine.add_policy("owner-1", second).await;

        let listed = engine.list_policies("owner-1").await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "first");
        assert_eq!(listed[1].name, "second");

        engine.remove_policy("owner-1", second_id).await.unwrap();
        let listed = engine.list_policies("owner-1").await;
        assert_eq!(listed.len(), 1);

        let err = engine.remove_policy("owner-1", second_id).await.unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_lists_are_isolated() {
        let engine = PolicyEngine::new();
        engine
            .set_policies(
                "owner-a",
                vec![Policy::new("allow_all", "*", PolicyEffect::Allow, RiskLevel::Low)],
            )
            .await;

        let decision = engine
            .evaluate_action("owner-a", "disable_account", "u-1", &ActionContext::default())
            .await;
        assert_eq!(decision.effect, PolicyEffect::Allow);

        // owner-b falls back to the default set, which has no allow-all.
        let decision = engine
            .evaluate_action("owner-b", "disable_account", "u-1", &ActionContext::default())
            .await;
        assert_eq!(decision.effect, PolicyEffect::RequireApproval);
    }
}
