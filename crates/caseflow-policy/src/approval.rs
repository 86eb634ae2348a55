//! Approval tracking for actions requiring human sign-off.
//!
//! This module provides a lightweight approval manager for tracking
//! approval requests and their lifecycle. Segregation of duties is
//! enforced at resolution time, not only at request creation.

use crate::engine::RiskLevel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors that can occur in approval management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// Approval request not found.
    #[error("Approval request not found: {0}")]
    NotFound(Uuid),

    /// Approval request has already been decided.
    #[error("Approval request has already been decided")]
    AlreadyDecided,

    /// Approval request has expired.
    #[error("Approval request has expired")]
    Expired,

    /// The requestor and approver are the same principal.
    #[error("Segregation of duties violation: {0}")]
    SegregationOfDuties(String),
}

/// Status of an approval request in the manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting decision.
    Pending,
    /// Approved by an approver.
    Approved,
    /// Denied by an approver.
    Denied,
    /// Expired without action.
    Expired,
    /// Cancelled by the requester or system.
    Cancelled,
}

impl ApprovalStatus {
    /// Returns true once the request can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Returns the snake_case string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Expired => "expired",
            ApprovalStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a segregation-of-duties check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SodCheck {
    pub ok: bool,
    pub reason: Option<String>,
}

/// Checks that the requestor and approver are distinct principals.
pub fn check_segregation_of_duties(requestor: &str, approver: &str) -> SodCheck {
    if requestor == approver {
        SodCheck {
            ok: false,
            reason: Some(format!(
                "requestor '{requestor}' cannot approve their own request"
            )),
        }
    } else {
        SodCheck {
            ok: true,
            reason: None,
        }
    }
}

/// An approval request tracked by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique identifier for the request.
    pub id: Uuid,
    /// Action awaiting approval.
    pub action: String,
    /// Resource the action targets.
    pub resource: String,
    /// Who requested the approval.
    pub requestor: String,
    /// Risk carried from the policy decision.
    pub risk: RiskLevel,
    /// Policy that required the approval, if any.
    pub policy_id: Option<Uuid>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request expires.
    pub expires_at: DateTime<Utc>,
    /// Current status of the request.
    pub status: ApprovalStatus,
    /// Who made the decision (if decided).
    pub decided_by: Option<String>,
    /// When the decision was made.
    pub decided_at: Option<DateTime<Utc>>,
    /// Comment from the decision maker.
    pub decision_comment: Option<String>,
}

impl ApprovalRequest {
    /// Checks if the request has expired based on current time.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Checks if the request is still pending and not expired.
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending && !self.is_expired()
    }

    /// Returns true when execution may proceed on this request: the
    /// request was approved by a principal other than the requestor.
    pub fn authorizes_execution(&self) -> bool {
        self.status == ApprovalStatus::Approved
            && self
                .decided_by
                .as_deref()
                .map(|approver| check_segregation_of_duties(&self.requestor, approver).ok)
                .unwrap_or(false)
    }
}

/// Manager for tracking approval requests.
///
/// Provides thread-safe storage and operations for approval requests,
/// including submission, approval, denial, cancellation, and cleanup.
#[derive(Clone)]
pub struct ApprovalManager {
    requests: Arc<RwLock<HashMap<Uuid, ApprovalRequest>>>,
    /// Default expiration time in seconds.
    default_expiration_secs: u64,
}

impl ApprovalManager {
    pub fn new(expiration_secs: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            default_expiration_secs: expiration_secs,
        }
    }

    /// Submits a new approval request for an action the policy engine
    /// gated behind approval.
    pub async fn submit_request(
        &self,
        action: &str,
        resource: &str,
        requestor: &str,
        risk: RiskLevel,
        policy_id: Option<Uuid>,
    ) -> ApprovalRequest {
        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            action: action.to_string(),
            resource: resource.to_string(),
            requestor: requestor.to_string(),
            risk,
            policy_id,
            created_at: now,
            expires_at: now + Duration::seconds(self.default_expiration_secs as i64),
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
        };

        let mut requests = self.requests.write().await;
        requests.insert(request.id, request.clone());

        info!(
            request_id = %request.id,
            action = %action,
            resource = %resource,
            requestor = %requestor,
            risk = ?risk,
            expires_at = %request.expires_at,
            "Approval requested"
        );

        request
    }

    /// Approves a pending request.
    ///
    /// Fails with [`ApprovalError::SegregationOfDuties`] when the approver
    /// is the requestor, with [`ApprovalError::AlreadyDecided`] on double
    /// resolution, and with [`ApprovalError::Expired`] past the deadline.
    pub async fn approve(
        &self,
        request_id: Uuid,
        approver: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(ApprovalError::NotFound(request_id))?;

        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided);
        }

        if request.is_expired() {
            request.status = ApprovalStatus::Expired;
            warn!(request_id = %request_id, "Attempted to approve expired request");
            return Err(ApprovalError::Expired);
        }

        let sod = check_segregation_of_duties(&request.requestor, approver);
        if !sod.ok {
            warn!(
                request_id = %request_id,
                approver = %approver,
                "Self-approval rejected"
            );
            return Err(ApprovalError::SegregationOfDuties(
                sod.reason.unwrap_or_default(),
            ));
        }

        request.status = ApprovalStatus::Approved;
        request.decided_by = Some(approver.to_string());
        request.decided_at = Some(Utc::now());
        request.decision_comment = comment.map(String::from);

        info!(
            request_id = %request_id,
            approver = %approver,
            action = %request.action,
            resource = %request.resource,
            "Approval granted"
        );

        Ok(request.clone())
    }

    /// Denies a pending request. Subject to the same segregation-of-duties
    /// and lifecycle checks as [`approve`](Self::approve).
    pub async fn deny(
        &self,
        request_id: Uuid,
        denier: &str,
        reason: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(ApprovalError::NotFound(request_id))?;

        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided);
        }

        if request.is_expired() {
            request.status = ApprovalStatus::Expired;
            warn!(request_id = %request_id, "Attempted to deny expired request");
            return Err(ApprovalError::Expired);
        }

        let sod = check_segregation_of_duties(&request.requestor, denier);
        if !sod.ok {
            return Err(ApprovalError::SegregationOfDuties(
                sod.reason.unwrap_or_default(),
            ));
        }

        request.status = ApprovalStatus::Denied;
        request.decided_by = Some(denier.to_string());
        request.decided_at = Some(Utc::now());
        request.decision_comment = Some(reason.to_string());

        info!(
            request_id = %request_id,
            denier = %denier,
            action = %request.action,
            reason = %reason,
            "Approval denied"
        );

        Ok(request.clone())
    }

    /// Cancels a pending request.
    pub async fn cancel(&self, request_id: Uuid) -> Result<(), ApprovalError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or(ApprovalError::NotFound(request_id))?;

        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided);
        }

        request.status = ApprovalStatus::Cancelled;
        request.decided_at = Some(Utc::now());

        info!(request_id = %request_id, action = %request.action, "Approval request cancelled");
        Ok(())
    }

    /// Gets a request by ID.
    pub async fn get_request(&self, request_id: Uuid) -> Option<ApprovalRequest> {
        let requests = self.requests.read().await;
        requests.get(&request_id).cloned()
    }

    /// Lists all pending requests that have not expired.
    pub async fn list_pending(&self) -> Vec<ApprovalRequest> {
        let requests = self.requests.read().await;
        requests
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    /// Lists every request a given principal has submitted, newest first.
    pub async fn list_for_requestor(&self, requestor: &str) -> Vec<ApprovalRequest> {
        let requests = self.requests.read().await;
        let mut owned: Vec<ApprovalRequest> = requests
            .values()
            .filter(|r| r.requestor == requestor)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    /// Marks expired pending requests and returns how many newly expired.
    pub async fn cleanup_expired(&self) -> usize {
        let mut requests = self.requests.write().await;
        let mut count = 0;

        for request in requests.values_mut() {
            if request.status == ApprovalStatus::Pending && request.is_expired() {
                request.status = ApprovalStatus::Expired;
                request.decided_at = Some(Utc::now());
                count += 1;

                info!(
                    request_id = %request.id,
                    action = %request.action,
                    "Pending approval expired"
                );
            }
        }

        if count > 0 {
            warn!(count = count, "Expired pending approval requests");
        }

        count
    }
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segregation_of_duties_check() {
        let same = check_segregation_of_duties("user-1", "user-1");
        assert!(!same.ok);
        assert!(same.reason.is_some());

        let different = check_segregation_of_duties("user-1", "user-2");
        assert!(different.ok);
        assert!(different.reason.is_none());
    }

    #[tokio::test]
    async fn test_submit_and_approve() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("isolate_host", "workstation-001", "analyst-a", RiskLevel::High, None)
            .await;
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.decided_by.is_none());

        let approved = manager
            .approve(request.id, "analyst-b", Some("confirmed malicious"))
            .await
            .unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.decided_by, Some("analyst-b".to_string()));
        assert!(approved.authorizes_execution());
    }

    #[tokio::test]
    async fn test_self_approval_rejected_at_resolution() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("disable_account", "user-7", "analyst-a", RiskLevel::High, None)
            .await;

        let result = manager.approve(request.id, "analyst-a", None).await;
        assert!(matches!(result, Err(ApprovalError::SegregationOfDuties(_))));

        // Still pending, so a different approver may resolve it.
        let approved = manager.approve(request.id, "analyst-b", None).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_self_denial_rejected() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("disable_account", "user-7", "analyst-a", RiskLevel::High, None)
            .await;

        let result = manager.deny(request.id, "analyst-a", "changed my mind").await;
        assert!(matches!(result, Err(ApprovalError::SegregationOfDuties(_))));
    }

    #[tokio::test]
    async fn test_double_resolution_conflicts() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("block_ip", "10.0.0.9", "analyst-a", RiskLevel::Medium, None)
            .await;

        manager.approve(request.id, "analyst-b", None).await.unwrap();

        let result = manager.approve(request.id, "analyst-c", None).await;
        assert!(matches!(result, Err(ApprovalError::AlreadyDecided)));

        let result = manager.deny(request.id, "analyst-c", "late").await;
        assert!(matches!(result, Err(ApprovalError::AlreadyDecided)));
    }

    #[tokio::test]
    async fn test_deny_records_reason() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("disable_account", "user-7", "analyst-a", RiskLevel::High, None)
            .await;

        let denied = manager
            .deny(request.id, "manager-1", "false positive")
            .await
            .unwrap();
        assert_eq!(denied.status, ApprovalStatus::Denied);
        assert_eq!(denied.decision_comment, Some("false positive".to_string()));
        assert!(!denied.authorizes_execution());
    }

    #[tokio::test]
    async fn test_cancel_and_not_found() {
        let manager = ApprovalManager::new(3600);

        let request = manager
            .submit_request("quarantine_file", "/tmp/x", "analyst-a", RiskLevel::Low, None)
            .await;

        manager.cancel(request.id).await.unwrap();
        let updated = manager.get_request(request.id).await.unwrap();
        assert_eq!(updated.status, ApprovalStatus::Cancelled);

        let result = manager.approve(Uuid::new_v4(), "analyst-b", None).await;
        assert!(matches!(result, Err(ApprovalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_pending_excludes_resolved() {
        let manager = ApprovalManager::new(3600);

        let r1 = manager
            .submit_request("a1", "t1", "analyst-a", RiskLevel::Low, None)
            .await;
        let r2 = manager
            .submit_request("a2", "t2", "analyst-a", RiskLevel::Low, None)
            .await;
        let r3 = manager
            .submit_request("a3", "t3", "analyst-a", RiskLevel::Low, None)
            .await;

        manager.approve(r1.id, "analyst-b", None).await.unwrap();
        manager.deny(r2.id, "analyst-b", "no").await.unwrap();

        let pending = manager.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, r3.id);
    }

    #[tokio::test]
    async fn test_list_for_requestor() {
        let manager = ApprovalManager::new(3600);

        manager
            .submit_request("a1", "t1", "analyst-a", RiskLevel::Low, None)
            .await;
        manager
            .submit_request("a2", "t2", "analyst-b", RiskLevel::Low, None)
            .await;
        manager
            .submit_request("a3", "t3", "analyst-a", RiskLevel::Low, None)
            .await;

        let owned = manager.list_for_requestor("analyst-a").await;
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|r| r.requestor == "analyst-a"));
    }

    #[tokio::test]
    async fn test_expired_request_cannot_be_approved() {
        let manager = ApprovalManager::new(1);

        let request = manager
            .submit_request("a1", "t1", "analyst-a", RiskLevel::Low, None)
            .await;

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        let result = manager.approve(request.id, "analyst-b", None).await;
        assert!(matches!(result, Err(ApprovalError::Expired)));

        let updated = manager.get_request(request.id).await.unwrap();
        assert_eq!(updated.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn test_cleanup_expired_only_touches_pending() {
        let manager = ApprovalManager::new(1);

        manager
            .submit_request("a1", "t1", "analyst-a", RiskLevel::Low, None)
            .await;
        let approved = manager
            .submit_request("a2", "t2", "analyst-a", RiskLevel::Low, None)
            .await;
        manager.approve(approved.id, "analyst-b", None).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        let count = manager.cleanup_expired().await;
        assert_eq!(count, 1);

        let still_approved = manager.get_request(approved.id).await.unwrap();
        assert_eq!(still_approved.status, ApprovalStatus::Approved);
    }
}
