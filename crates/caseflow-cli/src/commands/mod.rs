//! CLI subcommand implementations.

pub mod serve;

pub use serve::{run_server, ServeConfig};
