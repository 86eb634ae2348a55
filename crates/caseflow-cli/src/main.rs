//! Caseflow CLI
//!
//! Command-line interface for the Caseflow investigation orchestration
//! server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;
mod validator;

use commands::{run_server, ServeConfig};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(version)]
#[command(about = "Investigation orchestration with policy-gated actions", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Validate configuration and exit without starting the server
        #[arg(long)]
        validate_only: bool,
    },

    /// Validate a configuration file
    ValidateConfig {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    caseflow_observability::init_logging_with_config(caseflow_observability::LoggingConfig {
        level: log_level,
        json_format: cli.json_logs,
        ..Default::default()
    });

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path).unwrap_or_else(|_| {
        if cli.verbose {
            eprintln!("No config file found, using built-in defaults");
        }
        AppConfig::default()
    });

    match cli.command {
        Commands::Serve {
            port,
            host,
            validate_only,
        } => {
            let serve_config = ServeConfig {
                port: port.unwrap_or(config.server.port),
                host: host.unwrap_or_else(|| config.server.host.clone()),
            };
            cmd_serve(serve_config, config, validate_only).await
        }
        Commands::ValidateConfig { config: cfg_path } => {
            cmd_validate(cfg_path.unwrap_or(config_path)).await
        }
        Commands::Version => cmd_version(),
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "caseflow", "caseflow") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/default.yaml")
    }
}

async fn cmd_serve(
    serve_config: ServeConfig,
    app_config: AppConfig,
    validate_only: bool,
) -> Result<()> {
    println!("{}", "Checking configuration...".cyan());

    let validation = ConfigValidator::validate(&app_config);
    validation.print();

    if validate_only {
        if validation.has_errors() {
            println!();
            println!(
                "{}",
                "Validation failed. Resolve the errors above before starting the server."
                    .red()
                    .bold()
            );
            std::process::exit(1);
        }
        println!();
        println!(
            "{}",
            "Configuration is valid. The server can be started."
                .green()
                .bold()
        );
        return Ok(());
    }

    if validation.has_errors() {
        println!();
        println!(
            "{}",
            "Startup aborted due to configuration errors. Resolve them and try again."
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    println!();
    run_server(serve_config, app_config).await
}

async fn cmd_validate(config_path: PathBuf) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{}: {}", "Configuration file error".red().bold(), e);
            std::process::exit(1);
        }
    };

    let validation = ConfigValidator::validate(&config);
    validation.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!(
        "  Max concurrent investigations: {}",
        config.orchestrator.max_concurrent_investigations
    );
    println!("  Approval expiry: {}s", config.approvals.expiration_secs);
    println!("  Dispatch connector: {}", config.dispatch_connector);
    println!("  Connectors: {}", config.connectors.len());

    if validation.has_errors() {
        println!();
        println!(
            "{}",
            "Validation failed. Resolve the errors above.".red().bold()
        );
        std::process::exit(1);
    } else if validation.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid, with warnings.".yellow().bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

fn cmd_version() -> Result<()> {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    Ok(())
}
