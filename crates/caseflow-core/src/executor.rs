//! Resilient execution of external calls.
//!
//! Provides error classification, retry with exponential backoff and
//! jitter, bounded parallel fan-out, and a tool executor that records every
//! invocation to an audit sink.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::CoreError;
use crate::types::{ActionExecutionRecord, ExecutionStatus};

/// Classification of an external-call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Timeout,
    Network,
    RateLimit,
    ServerError,
    Auth,
    NotFound,
    InvalidRequest,
    Unknown,
}

impl ErrorClass {
    /// Classes worth retrying: the failure may clear on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::Timeout
                | ErrorClass::Network
                | ErrorClass::RateLimit
                | ErrorClass::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Network => "network",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::ServerError => "server_error",
            ErrorClass::Auth => "auth",
            ErrorClass::NotFound => "not_found",
            ErrorClass::InvalidRequest => "invalid_request",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a core error into an [`ErrorClass`].
///
/// Structured variants map directly; free-text variants fall back to
/// message inspection.
pub fn classify_error(error: &CoreError) -> ErrorClass {
    match error {
        CoreError::Timeout(_) => ErrorClass::Timeout,
        CoreError::NotFound { .. } => ErrorClass::NotFound,
        CoreError::Validation(_) => ErrorClass::InvalidRequest,
        CoreError::PolicyDenied(_) => ErrorClass::Auth,
        CoreError::DuplicateInvestigation { .. } | CoreError::Conflict(_) => {
            ErrorClass::InvalidRequest
        }
        CoreError::TransientExternal(msg)
        | CoreError::Storage(msg)
        | CoreError::Internal(msg) => classify_message(msg),
    }
}

/// Classifies a raw error message by its text.
pub fn classify_message(msg: &str) -> ErrorClass {
    let lower = msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline") {
        ErrorClass::Timeout
    } else if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("unreachable")
    {
        ErrorClass::Network
    } else if lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("429")
        || lower.contains("throttl")
    {
        ErrorClass::RateLimit
    } else if lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("internal server error")
        || lower.contains("service unavailable")
    {
        ErrorClass::ServerError
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("authentication")
    {
        ErrorClass::Auth
    } else if lower.contains("404") || lower.contains("not found") {
        ErrorClass::NotFound
    } else if lower.contains("400")
        || lower.contains("invalid")
        || lower.contains("bad request")
        || lower.contains("malformed")
    {
        ErrorClass::InvalidRequest
    } else {
        ErrorClass::Unknown
    }
}

/// Executes an operation with retry on retryable error classes.
///
/// Performs at most `max_retries + 1` attempts. The delay before retry
/// `k+1` is `min(max_delay, base * factor^(k-1))`, jittered +/-20% when
/// enabled.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    f: F,
) -> Result<T, CoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let (result, _attempts) = with_retry_counted(config, operation, f).await;
    result
}

/// Like [`with_retry`], additionally reporting the number of attempts made.
pub async fn with_retry_counted<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    f: F,
) -> (Result<T, CoreError>, u32)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = %operation,
                        attempts,
                        "operation succeeded after retry"
                    );
                }
                return (Ok(result), attempts);
            }
            Err(e) => {
                let class = classify_error(&e);
                let retries_used = attempts - 1;
                if !class.is_retryable() || retries_used >= config.max_retries {
                    if retries_used > 0 {
                        warn!(
                            operation = %operation,
                            attempts,
                            error = %e,
                            error_class = %class,
                            "operation failed after retries"
                        );
                    }
                    return (Err(e), attempts);
                }

                let delay = config.delay_for_attempt(retries_used);
                warn!(
                    operation = %operation,
                    attempt = attempts,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    error_class = %class,
                    "transient error, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Maps `items` through an async `mapper` with bounded concurrency.
///
/// Results preserve input order. The whole operation fails on the first
/// mapper error.
pub async fn parallel_map<I, T, U, F, Fut>(
    items: I,
    concurrency: usize,
    mapper: F,
) -> Result<Vec<U>, CoreError>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<U, CoreError>>,
{
    let concurrency = concurrency.max(1);
    stream::iter(items.into_iter().map(|item| mapper(item)))
        .buffered(concurrency)
        .try_collect()
        .await
}

/// Sink for append-only action execution records.
///
/// Implementations must never let a failed write disturb the caller; the
/// executor logs and swallows sink errors.
#[async_trait]
pub trait ActionAuditSink: Send + Sync {
    async fn record_execution(&self, record: ActionExecutionRecord) -> Result<(), CoreError>;
}

/// Audit sink that drops everything. Useful in tests.
pub struct NoopActionAudit;

#[async_trait]
impl ActionAuditSink for NoopActionAudit {
    async fn record_execution(&self, _record: ActionExecutionRecord) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Dispatches a named action to whatever actually performs it.
///
/// The business semantics of individual actions live behind this seam;
/// the executor only cares about retries and auditing.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        action: &str,
        resource: &str,
        params: &Value,
    ) -> Result<Value, CoreError>;
}

/// Wraps action dispatch with retry and audit recording.
pub struct ToolExecutor {
    retry: RetryConfig,
    audit: Arc<dyn ActionAuditSink>,
}

impl ToolExecutor {
    pub fn new(retry: RetryConfig, audit: Arc<dyn ActionAuditSink>) -> Self {
        Self { retry, audit }
    }

    /// Executes `f` under the retry policy and records an execution record
    /// on both success and failure. Audit-write failures are logged and
    /// swallowed.
    pub async fn execute<F, Fut>(
        &self,
        tool: &str,
        tenant_id: &str,
        approval_request_id: Option<Uuid>,
        request: Value,
        f: F,
    ) -> Result<Value, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, CoreError>>,
    {
        let started_at = Utc::now();
        let (result, attempts) = with_retry_counted(&self.retry, tool, f).await;
        let finished_at = Utc::now();

        let record = match &result {
            Ok(response) => ActionExecutionRecord {
                id: Uuid::new_v4(),
                approval_request_id,
                tool: tool.to_string(),
                request,
                response: Some(response.clone()),
                status: ExecutionStatus::Success,
                error_class: None,
                retries: attempts.saturating_sub(1),
                started_at,
                finished_at,
                tenant_id: tenant_id.to_string(),
            },
            Err(e) => ActionExecutionRecord {
                id: Uuid::new_v4(),
                approval_request_id,
                tool: tool.to_string(),
                request,
                response: None,
                status: ExecutionStatus::Failure,
                error_class: Some(classify_error(e).as_str().to_string()),
                retries: attempts.saturating_sub(1),
                started_at,
                finished_at,
                tenant_id: tenant_id.to_string(),
            },
        };

        if let Err(e) = self.audit.record_execution(record).await {
            warn!(tool = %tool, error = %e, "failed to record action execution");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("request timed out"), ErrorClass::Timeout);
        assert_eq!(
            classify_message("connection refused by host"),
            ErrorClass::Network
        );
        assert_eq!(
            classify_message("429 too many requests"),
            ErrorClass::RateLimit
        );
        assert_eq!(
            classify_message("503 service unavailable"),
            ErrorClass::ServerError
        );
        assert_eq!(classify_message("401 unauthorized"), ErrorClass::Auth);
        assert_eq!(classify_message("resource not found"), ErrorClass::NotFound);
        assert_eq!(
            classify_message("invalid parameter value"),
            ErrorClass::InvalidRequest
        );
        assert_eq!(classify_message("something odd"), ErrorClass::Unknown);
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ErrorClass::Timeout.is_retryable());
        assert!(ErrorClass::Network.is_retryable());
        assert!(ErrorClass::RateLimit.is_retryable());
        assert!(ErrorClass::ServerError.is_retryable());
        assert!(!ErrorClass::Auth.is_retryable());
        assert!(!ErrorClass::NotFound.is_retryable());
        assert!(!ErrorClass::InvalidRequest.is_retryable());
        assert!(!ErrorClass::Unknown.is_retryable());
    }

    #[test]
    fn test_classify_structured_error() {
        assert_eq!(
            classify_error(&CoreError::Timeout("step".to_string())),
            ErrorClass::Timeout
        );
        assert_eq!(
            classify_error(&CoreError::not_found("Alert", "a1")),
            ErrorClass::NotFound
        );
        assert_eq!(
            classify_error(&CoreError::TransientExternal(
                "upstream 503 service unavailable".to_string()
            )),
            ErrorClass::ServerError
        );
    }

    #[tokio::test]
    async fn test_with_retry_attempt_budget() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&fast_retry(3), "test_op", || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CoreError::TransientExternal("timeout".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        // 1 initial + 3 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_with_retry_no_retry_on_permanent_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&fast_retry(3), "test_op", || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CoreError::Validation("bad input".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_eventually_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&fast_retry(3), "test_op", || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CoreError::TransientExternal("network reset".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parallel_map_preserves_order() {
        let items = vec![3u64, 1, 2];
        let results = parallel_map(items, 2, |n| async move {
            // Later inputs finish earlier; order must still hold.
            sleep(Duration::from_millis(n * 5)).await;
            Ok(n * 10)
        })
        .await
        .unwrap();

        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_parallel_map_fails_on_error() {
        let result = parallel_map(vec![1, 2, 3], 2, |n| async move {
            if n == 2 {
                Err(CoreError::Internal("boom".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Internal(_))));
    }

    struct CollectingAudit {
        records: Mutex<Vec<ActionExecutionRecord>>,
    }

    #[async_trait]
    impl ActionAuditSink for CollectingAudit {
        async fn record_execution(
            &self,
            record: ActionExecutionRecord,
        ) -> Result<(), CoreError> {
            self.records.lock().await.push(record);
            Ok(())
        }
    }

    struct FailingAudit;

    #[async_trait]
    impl ActionAuditSink for FailingAudit {
        async fn record_execution(
            &self,
            _record: ActionExecutionRecord,
        ) -> Result<(), CoreError> {
            Err(CoreError::Storage("audit store down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_tool_executor_records_success() {
        let audit = Arc::new(CollectingAudit {
            records: Mutex::new(Vec::new()),
        });
        let executor = ToolExecutor::new(fast_retry(2), audit.clone());

        let response = executor
            .execute(
                "create_ticket",
                "tenant-1",
                None,
                serde_json::json!({"summary": "test"}),
                || async { Ok(serde_json::json!({"ticket": "T-1"})) },
            )
            .await
            .unwrap();

        assert_eq!(response["ticket"], "T-1");
        let records = audit.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Success);
        assert_eq!(records[0].retries, 0);
        assert!(records[0].error_class.is_none());
    }

    #[tokio::test]
    async fn test_tool_executor_records_failure_with_class() {
        let audit = Arc::new(CollectingAudit {
            records: Mutex::new(Vec::new()),
        });
        let executor = ToolExecutor::new(fast_retry(1), audit.clone());

        let result = executor
            .execute(
                "disable_account",
                "tenant-1",
                None,
                serde_json::json!({}),
                || async {
                    Err::<Value, _>(CoreError::TransientExternal(
                        "gateway 504".to_string(),
                    ))
                },
            )
            .await;

        assert!(result.is_err());
        let records = audit.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Failure);
        assert_eq!(records[0].retries, 1);
        assert_eq!(records[0].error_class.as_deref(), Some("server_error"));
    }

    #[tokio::test]
    async fn test_tool_executor_swallows_audit_failure() {
        let executor = ToolExecutor::new(fast_retry(0), Arc::new(FailingAudit));

        let response = executor
            .execute(
                "create_ticket",
                "tenant-1",
                None,
                serde_json::json!({}),
                || async { Ok(serde_json::json!({"ok": true})) },
            )
            .await
            .unwrap();

        assert_eq!(response["ok"], true);
    }
}
