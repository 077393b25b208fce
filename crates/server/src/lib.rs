//! Stdio JSON-RPC server exposing `OpenAPI` operations as MCP tools.

pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod rpc;

use crate::cli::Cli;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use specmill_openapi_tools::executor::ToolExecutor;
use specmill_openapi_tools::generator::ToolRegistry;
use specmill_openapi_tools::spec::load_spec;
use std::sync::Arc;
use tokio::io::BufReader;

/// Load the document, build the tool registry, and serve stdin/stdout until input closes.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded, tool generation fails, or stdio breaks.
pub async fn run(cli: &Cli) -> Result<()> {
    let spec = load_spec(&cli.spec)?;
    let registry = Arc::new(ToolRegistry::generate(Arc::new(spec))?);
    let executor = ToolExecutor::new(registry, &cli.tool_source_config());

    tracing::info!(
        tools = executor.registry().len(),
        base_url = %executor.base_url(),
        "Serving on stdio"
    );

    let dispatcher = Dispatcher::new(executor);
    dispatcher
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
