//! Tools module - callable tools for model function calling
//!
//! Tools are only bound to the model when `dispatch.use_tools` is on.
//! Otherwise the registry stays empty and the model signals side effects
//! through pseudo-commands instead.
//!
//! # Overview
//!
//! - `Tool` trait: the interface every tool implements
//! - `ToolContext`: execution context (channel, chat_id)
//! - `ToolRegistry`: exact-name registry used by the dispatch loop
//!
//! # Built-in Tools
//!
//! - `multiply`, `author`, `get_current_time`, `get_search_instructions`
//! - `get_website_content`, `ddgs_search`, `get_youtube_transcript`
//! - MCP server tools, registered last
//!
//! # Example
//!
//! ```rust
//! use chatrelay::tools::{MultiplyTool, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(MultiplyTool));
//!
//! let result = registry.execute("multiply", json!({"first_int": 5, "second_int": 7})).await;
//! assert_eq!(result.unwrap(), "35");
//! # });
//! ```

pub mod info;
pub mod math;
pub mod mcp;
mod registry;
pub mod time;
mod types;
pub mod web;
pub mod youtube;

use std::time::Duration;

use tracing::info;

use crate::config::Config;

pub use info::{AuthorTool, SearchInstructionsTool};
pub use math::MultiplyTool;
pub use registry::ToolRegistry;
pub use time::CurrentTimeTool;
pub use types::{Tool, ToolContext};
pub use web::{
    ContentFetcher, DdgSearchTool, FetchError, GetWebsiteContentTool, HttpContentFetcher,
};
pub use youtube::YoutubeTranscriptTool;

/// Characters per token used to size tool output against the token budget.
const CHARS_PER_TOKEN: usize = 4;

/// The built-in tools, in the order they are offered to the model.
pub fn builtin_tools(config: &Config) -> Vec<Box<dyn Tool>> {
    let timeout = Duration::from_secs(config.fetch.request_timeout_secs);
    vec![
        Box::new(MultiplyTool),
        Box::new(GetWebsiteContentTool::new(Box::new(
            HttpContentFetcher::from_config(&config.fetch),
        ))),
        Box::new(AuthorTool),
        Box::new(CurrentTimeTool),
        Box::new(DdgSearchTool::new(timeout)),
        Box::new(YoutubeTranscriptTool::new(
            timeout,
            config.dispatch.context_max_tokens * CHARS_PER_TOKEN,
        )),
        Box::new(SearchInstructionsTool),
    ]
}

/// Build the registry the dispatch loop uses.
///
/// Empty when tools are disabled. MCP tools are registered after the
/// built-ins and replace any built-in with the same name.
pub async fn build_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if !config.dispatch.use_tools {
        return registry;
    }

    for tool in builtin_tools(config) {
        registry.register(tool);
    }
    for tool in mcp::load_mcp_tools(&config.mcp).await {
        registry.register(tool);
    }

    info!(tools = registry.len(), "Tool registry ready");
    registry
}
