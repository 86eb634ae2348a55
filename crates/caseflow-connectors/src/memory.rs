//! In-process connector backed by canned data.
//!
//! Serves configured responses keyed by the request's `op` field and
//! records every query it receives. Failure injection hooks make it the
//! workhorse for registry and orchestration tests.

use crate::traits::{
    Connector, ConnectorConfig, ConnectorError, ConnectorFactory, ConnectorMetrics,
    ConnectorResult, ConnectorType, HealthReport,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Connector that answers queries from an in-memory response table.
pub struct MemoryConnector {
    id: String,
    tenant_id: String,
    responses: RwLock<HashMap<String, Value>>,
    query_log: RwLock<Vec<Value>>,
    fail_query: RwLock<Option<String>>,
    fail_health: RwLock<Option<String>>,
    fail_shutdown: RwLock<Option<String>>,
    metrics: RwLock<ConnectorMetrics>,
}

impl MemoryConnector {
    pub fn new(id: &str, tenant_id: &str) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            responses: RwLock::new(HashMap::new()),
            query_log: RwLock::new(Vec::new()),
            fail_query: RwLock::new(None),
            fail_health: RwLock::new(None),
            fail_shutdown: RwLock::new(None),
            metrics: RwLock::new(ConnectorMetrics::default()),
        }
    }

    /// Installs a canned response for an `op`.
    pub async fn set_response(&self, op: &str, response: Value) {
        let mut responses = self.responses.write().await;
        responses.insert(op.to_string(), response);
    }

    /// Makes subsequent queries fail with the given message, or succeed
    /// again when `None`.
    pub async fn set_query_failure(&self, message: Option<String>) {
        *self.fail_query.write().await = message;
    }

    /// Makes subsequent health checks fail with the given message.
    pub async fn set_health_failure(&self, message: Option<String>) {
        *self.fail_health.write().await = message;
    }

    /// Makes shutdown fail with the given message.
    pub async fn set_shutdown_failure(&self, message: Option<String>) {
        *self.fail_shutdown.write().await = message;
    }

    /// Returns every query received so far.
    pub async fn queries(&self) -> Vec<Value> {
        self.query_log.read().await.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Memory
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn query(&self, request: Value) -> ConnectorResult<Value> {
        {
            let mut log = self.query_log.write().await;
            log.push(request.clone());
        }

        if let Some(message) = self.fail_query.read().await.clone() {
            let mut metrics = self.metrics.write().await;
            metrics.requests_total += 1;
            metrics.failures_total += 1;
            metrics.last_failure = Some(Utc::now());
            return Err(ConnectorError::RequestFailed(message));
        }

        let response = {
            let op = request.get("op").and_then(Value::as_str).unwrap_or_default();
            let responses = self.responses.read().await;
            // Unconfigured ops echo the request back.
            responses.get(op).cloned().unwrap_or_else(|| request.clone())
        };

        let mut metrics = self.metrics.write().await;
        metrics.requests_total += 1;
        metrics.last_latency_ms = Some(0);
        metrics.last_success = Some(Utc::now());
        Ok(response)
    }

    async fn perform_health_check(&self) -> ConnectorResult<HealthReport> {
        if let Some(message) = self.fail_health.read().await.clone() {
            return Err(ConnectorError::ConnectionFailed(message));
        }
        Ok(HealthReport::healthy(0))
    }

    async fn shutdown(&self) -> ConnectorResult<()> {
        if let Some(message) = self.fail_shutdown.read().await.clone() {
            return Err(ConnectorError::Internal(message));
        }
        Ok(())
    }

    async fn metrics(&self) -> ConnectorMetrics {
        self.metrics.read().await.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Factory producing [`MemoryConnector`] instances.
pub struct MemoryConnectorFactory;

impl ConnectorFactory for MemoryConnectorFactory {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Memory
    }

    fn build(&self, config: &ConnectorConfig) -> ConnectorResult<Arc<dyn Connector>> {
        Ok(Arc::new(MemoryConnector::new(&config.id, &config.tenant_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_canned_response_and_echo() {
        let connector = MemoryConnector::new("mem-1", "tenant-1");
        connector
            .set_response("lookup_user", json!({"user": "alice", "active": true}))
            .await;

        let hit = connector
            .query(json!({"op": "lookup_user", "id": "alice"}))
            .await
            .unwrap();
        assert_eq!(hit["user"], "alice");

        let echo = connector.query(json!({"op": "unknown", "x": 1})).await.unwrap();
        assert_eq!(echo["x"], 1);

        assert_eq!(connector.queries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection_and_metrics() {
        let connector = MemoryConnector::new("mem-1", "tenant-1");

        connector.query(json!({"op": "a"})).await.unwrap();

        connector.set_query_failure(Some("down".to_string())).await;
        let err = connector.query(json!({"op": "a"})).await.unwrap_err();
        assert!(matches!(err, ConnectorError::RequestFailed(_)));

        let metrics = connector.metrics().await;
        assert_eq!(metrics.requests_total, 2);
        assert_eq!(metrics.failures_total, 1);
        assert!(metrics.last_success.is_some());
        assert!(metrics.last_failure.is_some());

        connector.set_query_failure(None).await;
        assert!(connector.query(json!({"op": "a"})).await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_failure() {
        let connector = MemoryConnector::new("mem-1", "tenant-1");
        assert!(connector.perform_health_check().await.is_ok());

        connector
            .set_health_failure(Some("unreachable".to_string()))
            .await;
        let err = connector.perform_health_check().await.unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectionFailed(_)));
    }
}
