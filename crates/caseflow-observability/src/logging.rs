//! Structured logging built on the tracing ecosystem.
//!
//! The subscriber is installed once at process start. A `RUST_LOG`
//! environment variable takes precedence over the configured level so
//! operators can raise verbosity per module without touching config.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level applied to all caseflow crates.
    pub level: Level,
    /// Emit JSON lines instead of human-readable output.
    pub json_format: bool,
    /// Emit span open/close events.
    pub include_spans: bool,
    /// Attach source file and line number to each event.
    pub include_location: bool,
    /// Attach the emitting thread id.
    pub include_thread_ids: bool,
    /// Attach the event target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose preset for local development.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// JSON preset for production deployments.
    pub fn production() -> Self {
        Self {
            json_format: true,
            include_spans: false,
            include_location: false,
            ..Self::default()
        }
    }
}

/// Initializes the logging system with default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes the logging system with the given configuration.
pub fn init_logging_with_config(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_ids)
        .with_target(config.include_target);

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        registry.with(base.json()).init();
    } else {
        registry.with(base).init();
    }
}

/// Builds the per-crate filter directives used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    [
        "caseflow_core",
        "caseflow_policy",
        "caseflow_connectors",
        "caseflow_observability",
        "caseflow_api",
        "caseflow",
    ]
    .map(|krate| format!("{krate}={level}"))
    .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pretty_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_production_preset_is_json() {
        let config = LoggingConfig::production();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json_format);
        assert!(!config.include_spans);
    }

    #[test]
    fn test_development_preset_is_debug() {
        let config = LoggingConfig::development();
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.json_format);
    }

    #[test]
    fn test_default_directives_cover_all_crates() {
        let directives = default_directives(Level::WARN);
        assert!(directives.contains("caseflow_core=WARN"));
        assert!(directives.contains("caseflow_api=WARN"));
        assert_eq!(directives.matches('=').count(), 6);
    }
}
