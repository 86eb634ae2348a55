//! Connector registry for Caseflow.
//!
//! Holds the keyed collection of live connector instances, builds them
//! through registered factories, runs parallel health sweeps with
//! per-connector failure isolation, and fans lifecycle events out to
//! subscribers.

use crate::circuit::{CircuitBreaker, CircuitConfig, CircuitState};
use crate::traits::{
    Connector, ConnectorConfig, ConnectorError, ConnectorFactory, ConnectorHealth,
    ConnectorMetrics, ConnectorResult, ConnectorType, HealthReport,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

/// Lifecycle events emitted by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    HealthCheckPassed { connector_id: String, latency_ms: u64 },
    HealthCheckFailed { connector_id: String, reason: String },
    CircuitOpened { connector_id: String },
    CircuitReset { connector_id: String },
    MetricsUpdated { connector_id: String },
    ConnectorError { connector_id: String, message: String },
}

/// One entry in the health sweep result map. Every registered connector
/// gets exactly one entry whether its probe succeeded or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckOutcome {
    pub connector_id: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<ConnectorHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Filter for listing registered connectors.
#[derive(Debug, Clone, Default)]
pub struct ConnectorFilter {
    pub tenant_id: Option<String>,
    pub connector_type: Option<ConnectorType>,
    pub enabled: Option<bool>,
}

/// Summary of a registered connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSummary {
    pub id: String,
    pub connector_type: ConnectorType,
    pub tenant_id: String,
    pub name: String,
    pub enabled: bool,
    pub circuit_state: String,
    pub registered_at: DateTime<Utc>,
}

struct RegisteredConnector {
    connector: Arc<dyn Connector>,
    config: ConnectorConfig,
    resolved_type: ConnectorType,
    breaker: Arc<CircuitBreaker>,
    registered_at: DateTime<Utc>,
}

/// Registry of connector instances keyed by id.
pub struct ConnectorRegistry {
    connectors: Arc<RwLock<HashMap<String, RegisteredConnector>>>,
    factories: RwLock<HashMap<ConnectorType, Arc<dyn ConnectorFactory>>>,
    events: broadcast::Sender<RegistryEvent>,
    circuit_config: CircuitConfig,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::with_circuit_config(CircuitConfig::default())
    }

    pub fn with_circuit_config(circuit_config: CircuitConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            connectors: Arc::new(RwLock::new(HashMap::new())),
            factories: RwLock::new(HashMap::new()),
            events,
            circuit_config,
        }
    }

    /// Subscribes to registry lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Registers a factory for a connector type, replacing any previous
    /// factory for that type.
    pub async fn register_factory(&self, factory: Arc<dyn ConnectorFactory>) {
        let connector_type = factory.connector_type();
        let mut factories = self.factories.write().await;
        factories.insert(connector_type, factory);
        debug!(connector_type = %connector_type, "Connector factory registered");
    }

    /// Builds, initializes, and stores a connector from configuration.
    ///
    /// Validates required fields, rejects duplicate ids, and requires a
    /// factory for the resolved type.
    #[instrument(skip(self, config), fields(connector_id = %config.id))]
    pub async fn register(&self, config: ConnectorConfig) -> ConnectorResult<()> {
        let resolved_type = config.validate()?;

        {
            let connectors = self.connectors.read().await;
            if connectors.contains_key(&config.id) {
                return Err(ConnectorError::DuplicateId(config.id.clone()));
            }
        }

        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(&resolved_type)
                .cloned()
                .ok_or_else(|| ConnectorError::UnknownType(config.connector_type.clone()))?
        };

        let connector = factory.build(&config)?;
        connector.initialize().await?;

        let entry = RegisteredConnector {
            connector,
            breaker: Arc::new(CircuitBreaker::new(&config.id, self.circuit_config.clone())),
            registered_at: Utc::now(),
            resolved_type,
            config,
        };

        let mut connectors = self.connectors.write().await;
        // A concurrent registration may have won the race since the
        // read-lock check above.
        if connectors.contains_key(&entry.config.id) {
            return Err(ConnectorError::DuplicateId(entry.config.id.clone()));
        }
        let id = entry.config.id.clone();
        connectors.insert(id.clone(), entry);
        info!(connector_id = %id, connector_type = %resolved_type, "Connector registered");
        Ok(())
    }

    /// Returns the connector instance for an id.
    pub async fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        let connectors = self.connectors.read().await;
        connectors.get(id).map(|e| Arc::clone(&e.connector))
    }

    /// Executes a query through the connector's circuit breaker.
    ///
    /// Rejected immediately when the circuit is open. Failures feed the
    /// breaker and are reported to subscribers.
    #[instrument(skip(self, request), fields(connector_id = %id))]
    pub async fn query(
        &self,
        id: &str,
        request: serde_json::Value,
    ) -> ConnectorResult<serde_json::Value> {
        let (connector, breaker, enabled) = {
            let connectors = self.connectors.read().await;
            let entry = connectors
                .get(id)
                .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
            (
                Arc::clone(&entry.connector),
                Arc::clone(&entry.breaker),
                entry.config.enabled,
            )
        };

        if !enabled {
            return Err(ConnectorError::InvalidRequest(format!(
                "connector '{id}' is disabled"
            )));
        }

        if !breaker.can_execute() {
            return Err(ConnectorError::CircuitOpen(id.to_string()));
        }

        match connector.query(request).await {
            Ok(response) => {
                if breaker.record_success() {
                    self.emit(RegistryEvent::CircuitReset {
                        connector_id: id.to_string(),
                    });
                }
                self.emit(RegistryEvent::MetricsUpdated {
                    connector_id: id.to_string(),
                });
                Ok(response)
            }
            Err(err) => {
                if breaker.record_failure() {
                    self.emit(RegistryEvent::CircuitOpened {
                        connector_id: id.to_string(),
                    });
                }
                self.emit(RegistryEvent::ConnectorError {
                    connector_id: id.to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Runs health checks across all connectors in parallel.
    ///
    /// Each probe is isolated: a failing connector contributes an error
    /// entry to the result map without aborting the sweep, and the
    /// aggregate call never fails.
    #[instrument(skip(self))]
    pub async fn perform_health_checks(&self) -> HashMap<String, HealthCheckOutcome> {
        let targets: Vec<(String, Arc<dyn Connector>, Arc<CircuitBreaker>)> = {
            let connectors = self.connectors.read().await;
            connectors
                .values()
                .filter(|e| e.config.enabled)
                .map(|e| {
                    (
                        e.config.id.clone(),
                        Arc::clone(&e.connector),
                        Arc::clone(&e.breaker),
                    )
                })
                .collect()
        };

        let probes = targets.into_iter().map(|(id, connector, breaker)| async move {
            let outcome = match connector.perform_health_check().await {
                Ok(report) => (id.clone(), Ok(report), breaker),
                Err(err) => (id.clone(), Err(err), breaker),
            };
            outcome
        });

        let mut results = HashMap::new();
        for (id, probe, breaker) in join_all(probes).await {
            match probe {
                Ok(report) => {
                    breaker.record_success();
                    self.emit(RegistryEvent::HealthCheckPassed {
                        connector_id: id.clone(),
                        latency_ms: report.latency_ms,
                    });
                    results.insert(
                        id.clone(),
                        HealthCheckOutcome {
                            connector_id: id,
                            healthy: report.health == ConnectorHealth::Healthy,
                            latency_ms: Some(report.latency_ms),
                            health: Some(report.health),
                            error: None,
                        },
                    );
                }
                Err(err) => {
                    if breaker.record_failure() {
                        self.emit(RegistryEvent::CircuitOpened {
                            connector_id: id.clone(),
                        });
                    }
                    self.emit(RegistryEvent::HealthCheckFailed {
                        connector_id: id.clone(),
                        reason: err.to_string(),
                    });
                    results.insert(
                        id.clone(),
                        HealthCheckOutcome {
                            connector_id: id,
                            healthy: false,
                            health: None,
                            latency_ms: None,
                            error: Some(err.to_string()),
                        },
                    );
                }
            }
        }

        debug!(checked = results.len(), "Health sweep complete");
        results
    }

    /// Lists connectors matching the filter.
    pub async fn list(&self, filter: &ConnectorFilter) -> Vec<ConnectorSummary> {
        let connectors = self.connectors.read().await;
        let mut summaries: Vec<ConnectorSummary> = connectors
            .values()
            .filter(|e| {
                filter
                    .tenant_id
                    .as_deref()
                    .map(|t| e.config.tenant_id == t)
                    .unwrap_or(true)
                    && filter
                        .connector_type
                        .map(|ct| e.resolved_type == ct)
                        .unwrap_or(true)
                    && filter.enabled.map(|en| e.config.enabled == en).unwrap_or(true)
            })
            .map(|e| ConnectorSummary {
                id: e.config.id.clone(),
                connector_type: e.resolved_type,
                tenant_id: e.config.tenant_id.clone(),
                name: e.config.name.clone(),
                enabled: e.config.enabled,
                circuit_state: e.breaker.state().to_string(),
                registered_at: e.registered_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Returns the metrics snapshot for a connector.
    pub async fn metrics(&self, id: &str) -> ConnectorResult<ConnectorMetrics> {
        let connector = self
            .get(id)
            .await
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
        Ok(connector.metrics().await)
    }

    /// Returns the circuit state for a connector.
    pub async fn circuit_state(&self, id: &str) -> ConnectorResult<CircuitState> {
        let connectors = self.connectors.read().await;
        let entry = connectors
            .get(id)
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
        Ok(entry.breaker.state())
    }

    /// Forces a connector's circuit breaker back to closed.
    pub async fn reset_circuit(&self, id: &str) -> ConnectorResult<()> {
        {
            let connectors = self.connectors.read().await;
            let entry = connectors
                .get(id)
                .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
            entry.breaker.reset();
        }
        self.emit(RegistryEvent::CircuitReset {
            connector_id: id.to_string(),
        });
        Ok(())
    }

    /// Removes a connector after shutting it down.
    pub async fn deregister(&self, id: &str) -> ConnectorResult<()> {
        let entry = {
            let mut connectors = self.connectors.write().await;
            connectors
                .remove(id)
                .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?
        };
        if let Err(err) = entry.connector.shutdown().await {
            warn!(connector_id = %id, error = %err, "Connector shutdown failed during deregister");
        }
        info!(connector_id = %id, "Connector deregistered");
        Ok(())
    }

    /// Shuts down every connector sequentially, tolerating individual
    /// failures, then clears the collection.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let entries: Vec<(String, Arc<dyn Connector>)> = {
            let connectors = self.connectors.read().await;
            connectors
                .values()
                .map(|e| (e.config.id.clone(), Arc::clone(&e.connector)))
                .collect()
        };

        for (id, connector) in entries {
            if let Err(err) = connector.shutdown().await {
                warn!(connector_id = %id, error = %err, "Connector shutdown failed");
            } else {
                debug!(connector_id = %id, "Connector shut down");
            }
        }

        let mut connectors = self.connectors.write().await;
        let count = connectors.len();
        connectors.clear();
        info!(count = count, "Connector registry shut down");
    }

    /// Number of registered connectors.
    pub async fn len(&self) -> usize {
        self.connectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connectors.read().await.is_empty()
    }

    fn emit(&self, event: RegistryEvent) {
        // Send only fails with no subscribers, which is fine.
        let _ = self.events.send(event);
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryConnectorFactory};

    async fn registry_with_memory_factory() -> ConnectorRegistry {
        let registry = ConnectorRegistry::with_circuit_config(CircuitConfig {
            failure_threshold: 2,
            success_threshold: 1,
            cooldown: std::time::Duration::from_millis(20),
        });
        registry
            .register_factory(Arc::new(MemoryConnectorFactory))
            .await;
        registry
    }

    fn memory_config(id: &str, tenant: &str) -> ConnectorConfig {
        ConnectorConfig::new(id, ConnectorType::Memory, tenant)
    }

    #[tokio::test]
    async fn test_register_and_query() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("conn-1", "tenant-1")).await.unwrap();

        let response = registry
            .query("conn-1", serde_json::json!({"op": "echo", "payload": 42}))
            .await
            .unwrap();
        assert_eq!(response["payload"], 42);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("conn-1", "tenant-1")).await.unwrap();

        let err = registry
            .register(memory_config("conn-1", "tenant-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_register_validates_config() {
        let registry = registry_with_memory_factory().await;

        let mut config = memory_config("", "tenant-1");
        config.id = String::new();
        assert!(matches!(
            registry.register(config).await,
            Err(ConnectorError::ConfigError(_))
        ));

        let mut config = memory_config("conn-1", "tenant-1");
        config.connector_type = "siem".to_string();
        // No SIEM factory registered.
        assert!(matches!(
            registry.register(config).await,
            Err(ConnectorError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_health_sweep_isolates_failures() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("good", "tenant-1")).await.unwrap();
        registry.register(memory_config("bad", "tenant-1")).await.unwrap();

        let bad = registry.get("bad").await.unwrap();
        let bad = bad
            .as_any()
            .downcast_ref::<MemoryConnector>()
            .expect("memory connector");
        bad.set_health_failure(Some("backend offline".to_string())).await;

        let results = registry.perform_health_checks().await;
        assert_eq!(results.len(), 2);

        let good = &results["good"];
        assert!(good.healthy);
        assert!(good.error.is_none());

        let bad = &results["bad"];
        assert!(!bad.healthy);
        assert!(bad.error.as_deref().unwrap_or("").contains("backend offline"));
    }

    #[tokio::test]
    async fn test_circuit_opens_and_emits_event() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("flaky", "tenant-1")).await.unwrap();
        let mut events = registry.subscribe();

        let connector = registry.get("flaky").await.unwrap();
        let flaky = connector
            .as_any()
            .downcast_ref::<MemoryConnector>()
            .expect("memory connector");
        flaky.set_query_failure(Some("boom".to_string())).await;

        for _ in 0..2 {
            let _ = registry.query("flaky", serde_json::json!({"op": "echo"})).await;
        }

        // Threshold 2 reached, further queries are rejected fast.
        let err = registry
            .query("flaky", serde_json::json!({"op": "echo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen(_)));

        let mut saw_open = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RegistryEvent::CircuitOpened { .. }) {
                saw_open = true;
            }
        }
        assert!(saw_open);

        registry.reset_circuit("flaky").await.unwrap();
        assert_eq!(
            registry.circuit_state("flaky").await.unwrap(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_list_filters() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("a", "tenant-1")).await.unwrap();
        registry.register(memory_config("b", "tenant-2")).await.unwrap();
        let mut disabled = memory_config("c", "tenant-1");
        disabled.enabled = false;
        registry.register(disabled).await.unwrap();

        let all = registry.list(&ConnectorFilter::default()).await;
        assert_eq!(all.len(), 3);

        let tenant1 = registry
            .list(&ConnectorFilter {
                tenant_id: Some("tenant-1".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(tenant1.len(), 2);

        let enabled = registry
            .list(&ConnectorFilter {
                enabled: Some(true),
                ..Default::default()
            })
            .await;
        assert_eq!(enabled.len(), 2);

        let memory = registry
            .list(&ConnectorFilter {
                connector_type: Some(ConnectorType::Memory),
                ..Default::default()
            })
            .await;
        assert_eq!(memory.len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_all_tolerates_failures_and_clears() {
        let registry = registry_with_memory_factory().await;
        registry.register(memory_config("ok", "tenant-1")).await.unwrap();
        registry.register(memory_config("stubborn", "tenant-1")).await.unwrap();

        let stubborn = registry.get("stubborn").await.unwrap();
        let stubborn = stubborn
            .as_any()
            .downcast_ref::<MemoryConnector>()
            .expect("memory connector");
        stubborn
            .set_shutdown_failure(Some("resource busy".to_string()))
            .await;

        registry.shutdown_all().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_disabled_connector_rejects_queries() {
        let registry = registry_with_memory_factory().await;
        let mut config = memory_config("off", "tenant-1");
        config.enabled = false;
        registry.register(config).await.unwrap();

        let err = registry
            .query("off", serde_json::json!({"op": "echo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidRequest(_)));

        // Disabled connectors are skipped by the sweep.
        let results = registry.perform_health_checks().await;
        assert!(results.is_empty());
    }
}
