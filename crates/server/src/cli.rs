use crate::error::{Result, ServerError};
use clap::{Parser, ValueEnum};
use specmill_openapi_tools::config::ToolSourceConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Serve the operations of an `OpenAPI` document as MCP tools over stdio.
#[derive(Debug, Parser)]
#[command(name = "specmill", version, about, long_about = None)]
pub struct Cli {
    /// Path to the `OpenAPI` 3.x document (YAML or JSON)
    #[arg(long, env = "SPECMILL_SPEC")]
    pub spec: PathBuf,

    /// Base URL for outbound calls; overrides the document's first server
    #[arg(long, env = "SPECMILL_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds (0 disables)
    #[arg(long, env = "SPECMILL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log filter directive, e.g. `info` or `specmill=debug`
    #[arg(long, env = "SPECMILL_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    #[must_use]
    pub fn tool_source_config(&self) -> ToolSourceConfig {
        ToolSourceConfig {
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Install the global tracing subscriber. Output goes to stderr; stdout is reserved for protocol
/// frames.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a subscriber is already installed.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| ServerError::Logging(format!("invalid log filter '{level}': {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => builder.with_ansi(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| ServerError::Logging(e.to_string()))
}
