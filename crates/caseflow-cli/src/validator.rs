//! Configuration validation for the Caseflow server binary.
//!
//! Startup validation catches configuration mistakes before any service
//! is composed, so a misconfigured server refuses to start instead of
//! failing at the first request.

use crate::config::AppConfig;
use caseflow_connectors::ConnectorType;
use colored::Colorize;
use std::collections::HashSet;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent startup.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent startup.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Creates a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Merges another validation result into this one.
    #[allow(dead_code)]
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before startup.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the application configuration.
    ///
    /// Returns a ValidationResult containing any errors and warnings found.
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_server(config, &mut result);
        Self::validate_orchestrator(config, &mut result);
        Self::validate_approvals(config, &mut result);
        Self::validate_rate_limit(config, &mut result);
        Self::validate_connectors(config, &mut result);
        Self::validate_dispatch(config, &mut result);

        result
    }

    /// Validates the HTTP listener settings.
    fn validate_server(config: &AppConfig, result: &mut ValidationResult) {
        if config.server.host.trim().is_empty() {
            result.add_error("server.host must not be empty (e.g., 0.0.0.0 or 127.0.0.1)");
        }
        if config.server.port == 0 {
            result.add_error("server.port must not be 0");
        }
    }

    /// Validates orchestrator tuning.
    fn validate_orchestrator(config: &AppConfig, result: &mut ValidationResult) {
        let orch = &config.orchestrator;

        if orch.max_concurrent_investigations == 0 {
            result.add_error(
                "orchestrator.max_concurrent_investigations must be at least 1. \
                 With a limit of 0 every new investigation would be queued forever.",
            );
        }

        if orch.default_timeout_ms == 0 {
            result.add_error("orchestrator.default_timeout_ms must be greater than 0");
        } else if orch.default_timeout_ms < 60_000 {
            result.add_warning(format!(
                "orchestrator.default_timeout_ms is {} ms (under one minute). \
                 Investigations may expire before their first step completes.",
                orch.default_timeout_ms
            ));
        }
    }

    /// Validates approval workflow settings.
    fn validate_approvals(config: &AppConfig, result: &mut ValidationResult) {
        if config.approvals.expiration_secs == 0 {
            result.add_error(
                "approvals.expiration_secs must be greater than 0. \
                 Requests with a zero lifetime would expire before anyone could decide them.",
            );
        }
    }

    /// Validates API rate limiting settings.
    fn validate_rate_limit(config: &AppConfig, result: &mut ValidationResult) {
        let rl = &config.rate_limit;

        if rl.per_client == 0 {
            result.add_error("rate_limit.per_client must be greater than 0");
        }
        if rl.global == 0 {
            result.add_error("rate_limit.global must be greater than 0");
        }
        if rl.window_secs == 0 {
            result.add_error("rate_limit.window_secs must be greater than 0");
        }
        if rl.max_clients == 0 {
            result.add_error("rate_limit.max_clients must be greater than 0");
        }

        if rl.per_client > 0 && rl.global > 0 && rl.per_client > rl.global {
            result.add_warning(format!(
                "rate_limit.per_client ({}) exceeds rate_limit.global ({}). \
                 The global limit will throttle clients before their own quota does.",
                rl.per_client, rl.global
            ));
        }
    }

    /// Validates connector configurations.
    fn validate_connectors(config: &AppConfig, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for connector in &config.connectors {
            if !seen.insert(connector.id.clone()) {
                result.add_error(format!(
                    "Duplicate connector id '{}'. Connector ids must be unique.",
                    connector.id
                ));
                continue;
            }

            match connector.validate() {
                Ok(kind) => {
                    if kind != ConnectorType::Memory {
                        result.add_warning(format!(
                            "Connector '{}' has type '{}', which has no built-in factory. \
                             Registration will fail unless a factory for it is installed.",
                            connector.id, connector.connector_type
                        ));
                    }
                }
                Err(e) => {
                    result.add_error(format!("Connector '{}': {}", connector.id, e));
                }
            }
        }
    }

    /// Validates that the dispatch connector can be resolved at startup.
    fn validate_dispatch(config: &AppConfig, result: &mut ValidationResult) {
        if config.dispatch_connector.trim().is_empty() {
            result.add_error("dispatch_connector must not be empty");
            return;
        }

        if config.connectors.is_empty() {
            result.add_warning(format!(
                "No connectors configured. A built-in memory connector '{}' \
                 will be registered so action dispatch works out of the box.",
                config.dispatch_connector
            ));
        } else if !config
            .connectors
            .iter()
            .any(|c| c.id == config.dispatch_connector)
        {
            result.add_error(format!(
                "dispatch_connector '{}' does not match any configured connector id. \
                 Action execution would fail on every dispatch.",
                config.dispatch_connector
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_connectors::ConnectorConfig;

    fn default_config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn test_validation_result_operations() {
        let mut result = ValidationResult::new();
        assert!(!result.has_errors());
        assert!(!result.has_warnings());

        result.add_error("Test error");
        assert!(result.has_errors());

        result.add_warning("Test warning");
        assert!(result.has_warnings());

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validation_result_merge() {
        let mut result1 = ValidationResult::new();
        result1.add_error("Error 1");

        let mut result2 = ValidationResult::new();
        result2.add_error("Error 2");
        result2.add_warning("Warning 1");

        result1.merge(result2);

        assert_eq!(result1.errors.len(), 2);
        assert_eq!(result1.warnings.len(), 1);
    }

    #[test]
    fn test_default_config_warns_but_starts() {
        let result = ConfigValidator::validate(&default_config());

        // Only the built-in memory connector warning is expected.
        assert!(!result.has_errors());
        assert!(result.has_warnings());
        assert!(result.warnings[0].contains("memory connector"));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut config = default_config();
        config.server.port = 0;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_server(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = default_config();
        config.orchestrator.max_concurrent_investigations = 0;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_orchestrator(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_short_timeout_warns() {
        let mut config = default_config();
        config.orchestrator.default_timeout_ms = 5_000;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_orchestrator(&config, &mut result);

        assert!(!result.has_errors());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_per_client_above_global_warns() {
        let mut config = default_config();
        config.rate_limit.per_client = 500;
        config.rate_limit.global = 100;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_rate_limit(&config, &mut result);

        assert!(!result.has_errors());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_zero_rate_limits_are_rejected() {
        let mut config = default_config();
        config.rate_limit.per_client = 0;
        config.rate_limit.window_secs = 0;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_rate_limit(&config, &mut result);

        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_unknown_connector_type_is_rejected() {
        let mut config = default_config();
        let mut connector = ConnectorConfig::new("siem-1", ConnectorType::Memory, "tenant-1");
        connector.connector_type = "mainframe".to_string();
        config.connectors.push(connector);

        let mut result = ValidationResult::new();
        ConfigValidator::validate_connectors(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_duplicate_connector_ids_are_rejected() {
        let mut config = default_config();
        config
            .connectors
            .push(ConnectorConfig::new("siem-1", ConnectorType::Memory, "tenant-1"));
        config
            .connectors
            .push(ConnectorConfig::new("siem-1", ConnectorType::Memory, "tenant-1"));

        let mut result = ValidationResult::new();
        ConfigValidator::validate_connectors(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_non_memory_connector_warns() {
        let mut config = default_config();
        config
            .connectors
            .push(ConnectorConfig::new("tickets", ConnectorType::Ticketing, "tenant-1"));
        config.dispatch_connector = "tickets".to_string();

        let result = ConfigValidator::validate(&config);

        assert!(!result.has_errors());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("no built-in factory")));
    }

    #[test]
    fn test_dispatch_must_match_a_connector() {
        let mut config = default_config();
        config
            .connectors
            .push(ConnectorConfig::new("siem-1", ConnectorType::Memory, "tenant-1"));
        config.dispatch_connector = "siem-2".to_string();

        let mut result = ValidationResult::new();
        ConfigValidator::validate_dispatch(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_empty_dispatch_connector_is_rejected() {
        let mut config = default_config();
        config.dispatch_connector = "  ".to_string();

        let mut result = ValidationResult::new();
        ConfigValidator::validate_dispatch(&config, &mut result);

        assert!(result.has_errors());
    }
}
