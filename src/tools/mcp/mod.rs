//! MCP (Model Context Protocol) tools.
//!
//! Every configured server is connected at startup and its tools are
//! registered after the built-ins. A server that fails to connect is
//! logged and skipped.

pub mod client;
pub mod types;
pub mod wrapper;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::McpConfig;
use crate::tools::Tool;

pub use client::McpClient;
pub use wrapper::McpToolWrapper;

/// Connect to every configured server and wrap the tools it lists.
pub async fn load_mcp_tools(config: &McpConfig) -> Vec<Box<dyn Tool>> {
    let mut names: Vec<&String> = config.servers.keys().collect();
    names.sort();

    let mut tools: Vec<Box<dyn Tool>> = Vec::new();
    for name in names {
        let server = &config.servers[name];
        let client = match McpClient::connect(name, server).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(server = %name, error = %e, "Failed to connect MCP server");
                continue;
            }
        };
        match client.list_tools().await {
            Ok(defs) => {
                info!(server = %name, tools = defs.len(), "MCP server connected");
                tools.extend(defs.into_iter().map(|def| {
                    Box::new(McpToolWrapper::new(def, Arc::clone(&client))) as Box<dyn Tool>
                }));
            }
            Err(e) => error!(server = %name, error = %e, "Failed to list MCP tools"),
        }
    }
    tools
}
