//! Serve command - composes the services and starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use caseflow_api::{ApiRateLimiter, AppState, RegistryDispatcher};
use caseflow_connectors::{
    ConnectorConfig, ConnectorRegistry, ConnectorType, MemoryConnectorFactory,
};
use caseflow_core::{
    AllowAllAlerts, InMemoryStore, MetricsConfig, Orchestrator, ResourceLimits, TimeoutConfig,
    TimeoutManager,
};
use caseflow_observability::{AuditLog, MetricsCollector};
use caseflow_policy::{ApprovalManager, PolicyEngine};

use crate::config::AppConfig;

/// Tenant the built-in memory connector is registered under when no
/// connectors are configured.
const BUILTIN_TENANT: &str = "default";

/// Server configuration from CLI arguments.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Port to listen on.
    pub port: u16,
    /// Hostname to bind to.
    pub host: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Runs the API server until Ctrl+C.
pub async fn run_server(config: ServeConfig, app_config: AppConfig) -> Result<()> {
    println!("{} Starting Caseflow API server...", "[server]".cyan());

    let store = Arc::new(InMemoryStore::new());
    let timeouts = Arc::new(TimeoutManager::new(
        TimeoutConfig::default(),
        ResourceLimits::default(),
    ));
    let audit = Arc::new(AuditLog::new(4096));
    let metrics = Arc::new(MetricsCollector::new(MetricsConfig::default()));

    let orchestrator = Orchestrator::new(
        app_config.orchestrator.to_orchestrator_config(),
        store.clone(),
        timeouts.clone(),
        audit.clone(),
        Arc::new(AllowAllAlerts),
    );
    orchestrator.install_timeout_handler().await;

    let registry = Arc::new(ConnectorRegistry::new());
    registry
        .register_factory(Arc::new(MemoryConnectorFactory))
        .await;

    if app_config.connectors.is_empty() {
        println!(
            "  {} No connectors configured, registering built-in memory connector '{}'",
            "→".green(),
            app_config.dispatch_connector
        );
        registry
            .register(ConnectorConfig::new(
                &app_config.dispatch_connector,
                ConnectorType::Memory,
                BUILTIN_TENANT,
            ))
            .await
            .context("Failed to register built-in memory connector")?;
    } else {
        for connector in &app_config.connectors {
            registry
                .register(connector.clone())
                .await
                .with_context(|| format!("Failed to register connector '{}'", connector.id))?;
            println!(
                "  {} Registered connector '{}' ({})",
                "✓".green(),
                connector.id,
                connector.connector_type
            );
        }
    }

    let dispatcher = Arc::new(RegistryDispatcher::new(
        registry.clone(),
        &app_config.dispatch_connector,
    ));
    let policy = Arc::new(PolicyEngine::new());
    let approvals = Arc::new(ApprovalManager::new(app_config.approvals.expiration_secs));

    let limiter = ApiRateLimiter::with_config(
        app_config.rate_limit.per_client,
        app_config.rate_limit.global,
        Duration::from_secs(app_config.rate_limit.window_secs),
        app_config.rate_limit.max_clients,
    );

    let state = AppState::new(
        orchestrator.clone(),
        store,
        policy,
        approvals,
        dispatcher,
        registry.clone(),
        audit,
        metrics,
    )
    .with_rate_limiter(limiter);

    // Background loops: queue admission and deadline sweeps.
    let orchestrator_task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };
    let timeout_task = {
        let timeouts = timeouts.clone();
        tokio::spawn(async move { timeouts.run().await })
    };

    let bind_address: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    println!();
    println!("{}", "Caseflow API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!(
        "  {} {}",
        "Dispatch connector:".cyan(),
        app_config.dispatch_connector
    );
    println!();
    println!("{}", "Endpoints:".bold());
    println!("  POST /investigations/start        - Start an investigation");
    println!("  GET  /investigations              - List investigations");
    println!("  GET  /investigations/stats        - Aggregate statistics");
    println!("  GET  /investigations/:id/status   - Status report");
    println!("  GET  /investigations/:id/timeline - Timeline of steps and feedback");
    println!("  POST /investigations/:id/feedback - Attach analyst feedback");
    println!("  POST /investigations/:id/pause    - Pause");
    println!("  POST /investigations/:id/resume   - Resume");
    println!("  POST /actions/:id/request         - Request an action (policy-gated)");
    println!("  POST /actions/:id/execute         - Execute an approved action");
    println!("  GET  /approvals                   - List approval requests");
    println!("  POST /approvals/:id/approve       - Approve a request");
    println!("  POST /approvals/:id/deny          - Deny a request");
    println!("  GET  /metrics/summary             - Metrics snapshot");
    println!("  GET  /health                      - Health check");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    tokio::select! {
        result = caseflow_api::serve(bind_address, state) => {
            result.context("Server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("{} Shutting down...", "[server]".cyan());
        }
    }

    orchestrator.shutdown().await;
    timeouts.shutdown();
    registry.shutdown_all().await;
    let _ = orchestrator_task.await;
    let _ = timeout_task.await;

    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
