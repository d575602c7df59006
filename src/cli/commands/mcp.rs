//! MCP command implementation.

use crate::config::Settings;
use crate::mcp::McpServer;
use anyhow::Result;
use tracing::debug;

/// Serve the tools over stdio until the client closes its input.
pub async fn run_mcp(settings: Settings) -> Result<()> {
    debug!(
        currency = %settings.flights.currency,
        market = %settings.flights.market,
        "Starting MCP server"
    );
    McpServer::new(settings).run().await
}
