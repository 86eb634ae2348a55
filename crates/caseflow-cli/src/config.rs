//! Configuration loading for the Caseflow server binary.

use anyhow::{Context, Result};
use caseflow_connectors::ConnectorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration, loaded from a YAML file.
///
/// Every section is optional; omitted sections fall back to built-in
/// defaults so a bare `caseflow serve` works without a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Orchestrator tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Approval workflow settings.
    #[serde(default)]
    pub approvals: ApprovalSettings,

    /// API rate limiting settings.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Connector the action dispatcher routes through.
    #[serde(default = "default_dispatch_connector")]
    pub dispatch_connector: String,

    /// Connectors to register at startup.
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

fn default_dispatch_connector() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            approvals: ApprovalSettings::default(),
            rate_limit: RateLimitSettings::default(),
            dispatch_connector: default_dispatch_connector(),
            connectors: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Global ceiling on simultaneously active investigations.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_investigations: usize,

    /// Default investigation deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    30 * 60 * 1000
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_investigations: default_max_concurrent(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl OrchestratorSettings {
    /// Builds the orchestrator configuration, keeping built-in defaults
    /// for the estimate and polling knobs.
    pub fn to_orchestrator_config(&self) -> caseflow_core::OrchestratorConfig {
        caseflow_core::OrchestratorConfig {
            max_concurrent_investigations: self.max_concurrent_investigations,
            default_timeout: std::time::Duration::from_millis(self.default_timeout_ms),
            ..Default::default()
        }
    }
}

/// Approval workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSettings {
    /// Seconds before a pending approval request expires.
    #[serde(default = "default_approval_expiration")]
    pub expiration_secs: u64,
}

fn default_approval_expiration() -> u64 {
    3600
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            expiration_secs: default_approval_expiration(),
        }
    }
}

/// API rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per client per window.
    #[serde(default = "default_rate_per_client")]
    pub per_client: u32,

    /// Requests allowed globally per window.
    #[serde(default = "default_rate_global")]
    pub global: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Maximum tracked clients before LRU eviction.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

fn default_rate_per_client() -> u32 {
    caseflow_api::rate_limit::DEFAULT_RATE_PER_CLIENT
}

fn default_rate_global() -> u32 {
    caseflow_api::rate_limit::DEFAULT_RATE_GLOBAL
}

fn default_window_secs() -> u64 {
    caseflow_api::rate_limit::DEFAULT_WINDOW_SECS
}

fn default_max_clients() -> usize {
    caseflow_api::rate_limit::DEFAULT_MAX_CLIENTS
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_client: default_rate_per_client(),
            global: default_rate_global(),
            window_secs: default_window_secs(),
            max_clients: default_max_clients(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dispatch_connector, "default");
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
server:
  port: 9090
connectors:
  - id: siem-1
    connector_type: memory
    tenant_id: tenant-1
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.orchestrator.max_concurrent_investigations, 10);
        assert_eq!(config.connectors.len(), 1);
        assert_eq!(config.connectors[0].id, "siem-1");
    }
}
