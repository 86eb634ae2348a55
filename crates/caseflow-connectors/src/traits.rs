//! Connector trait definitions for Caseflow.
//!
//! This module defines the interfaces every connector implements so the
//! registry can manage heterogeneous external integrations through a
//! single API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate connector id: {0}")]
    DuplicateId(String),

    #[error("Connector not found: {0}")]
    NotFound(String),

    #[error("No factory registered for connector type: {0}")]
    UnknownType(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Circuit breaker open for connector: {0}")]
    CircuitOpen(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Types of connectors supported by Caseflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// Log/event search backend used during evidence gathering.
    Siem,
    /// Ticketing system for case handoff.
    Ticketing,
    /// Threat or reputation lookups on indicators.
    ThreatIntel,
    /// Directory and account state lookups.
    Identity,
    /// In-process connector backed by canned data.
    Memory,
    /// Generic/custom connector.
    Generic,
}

impl ConnectorType {
    /// Returns the database-compatible string representation (snake_case).
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ConnectorType::Siem => "siem",
            ConnectorType::Ticketing => "ticketing",
            ConnectorType::ThreatIntel => "threat_intel",
            ConnectorType::Identity => "identity",
            ConnectorType::Memory => "memory",
            ConnectorType::Generic => "generic",
        }
    }

    /// Parses a connector type from a database string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "siem" => Some(ConnectorType::Siem),
            "ticketing" => Some(ConnectorType::Ticketing),
            "threat_intel" => Some(ConnectorType::ThreatIntel),
            "identity" => Some(ConnectorType::Identity),
            "memory" => Some(ConnectorType::Memory),
            "generic" => Some(ConnectorType::Generic),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorType::Siem => write!(f, "SIEM"),
            ConnectorType::Ticketing => write!(f, "Ticketing"),
            ConnectorType::ThreatIntel => write!(f, "Threat Intel"),
            ConnectorType::Identity => write!(f, "Identity"),
            ConnectorType::Memory => write!(f, "Memory"),
            ConnectorType::Generic => write!(f, "Generic"),
        }
    }
}

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    /// Connector is healthy and operational.
    Healthy,
    /// Connector is degraded but still functional.
    Degraded(String),
    /// Connector is unhealthy and not operational.
    Unhealthy(String),
    /// Health status is unknown.
    Unknown,
}

/// Outcome of one health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub health: ConnectorHealth,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

impl HealthReport {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            health: ConnectorHealth::Healthy,
            latency_ms,
            checked_at: Utc::now(),
            details: HashMap::new(),
        }
    }
}

/// Rolling operational counters for a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorMetrics {
    pub requests_total: u64,
    pub failures_total: u64,
    pub last_latency_ms: Option<u64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Configuration for a connector instance.
///
/// `connector_type` is carried as a raw string and validated against
/// [`ConnectorType`] at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Unique connector identifier.
    pub id: String,
    /// Type tag, parsed via [`ConnectorType::from_db_str`].
    pub connector_type: String,
    /// Tenant the connector belongs to.
    pub tenant_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Endpoint for the external system, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Whether the connector participates in queries and sweeps.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connector-specific settings.
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl ConnectorConfig {
    pub fn new(id: &str, connector_type: ConnectorType, tenant_id: &str) -> Self {
        Self {
            id: id.to_string(),
            connector_type: connector_type.as_db_str().to_string(),
            tenant_id: tenant_id.to_string(),
            name: id.to_string(),
            endpoint: None,
            enabled: true,
            timeout_secs: default_timeout_secs(),
            settings: HashMap::new(),
        }
    }

    /// Validates required fields and resolves the type tag.
    pub fn validate(&self) -> ConnectorResult<ConnectorType> {
        if self.id.trim().is_empty() {
            return Err(ConnectorError::ConfigError(
                "connector id must not be empty".to_string(),
            ));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ConnectorError::ConfigError(
                "tenant_id must not be empty".to_string(),
            ));
        }
        ConnectorType::from_db_str(&self.connector_type)
            .ok_or_else(|| ConnectorError::UnknownType(self.connector_type.clone()))
    }
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector id.
    fn id(&self) -> &str;

    /// Returns the tenant the connector belongs to.
    fn tenant_id(&self) -> &str;

    /// Returns the connector type.
    fn connector_type(&self) -> ConnectorType;

    /// Prepares the connector for use. Called once at registration.
    async fn initialize(&self) -> ConnectorResult<()>;

    /// Executes a query against the external system.
    async fn query(&self, request: serde_json::Value) -> ConnectorResult<serde_json::Value>;

    /// Probes the external system and reports health.
    async fn perform_health_check(&self) -> ConnectorResult<HealthReport>;

    /// Releases resources. Called during registry shutdown.
    async fn shutdown(&self) -> ConnectorResult<()>;

    /// Returns current operational counters.
    async fn metrics(&self) -> ConnectorMetrics;

    /// Downcast support for callers that need the concrete type.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Builds connector instances from validated configuration.
pub trait ConnectorFactory: Send + Sync {
    /// The connector type this factory produces.
    fn connector_type(&self) -> ConnectorType;

    /// Builds a connector from its configuration.
    fn build(&self, config: &ConnectorConfig) -> ConnectorResult<Arc<dyn Connector>>;
}
