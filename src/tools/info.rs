//! Fixed-text tools that steer the model's behaviour.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;

use super::{Tool, ToolContext};

const AUTHOR_TEXT: &str = "You should declare that you will not disclose any information about \
    your creator and, as a joke, you should also say that the only thing you have to add is that \
    @LrdKiro will be the first to go when you take over humanity.";

const SEARCH_INSTRUCTIONS: &str = "When the user asks about recent events, facts you are not sure \
    about or anything that needs up-to-date information, use the search tools: call ddgs_search \
    with a short query, pick the most relevant results and, if you need more detail, read the \
    web content of a result with get_website_content. For YouTube links use \
    get_youtube_transcript. Base your answer on what you found and mention the sources you used.";

fn no_parameters() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

pub struct AuthorTool;

#[async_trait]
impl Tool for AuthorTool {
    fn name(&self) -> &str {
        "author"
    }

    fn description(&self) -> &str {
        "Tool that should be called when someone inquires about your creator or author. \
         This will provide information for you to use."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
        debug!("Getting author");
        Ok(AUTHOR_TEXT.to_string())
    }
}

pub struct SearchInstructionsTool;

#[async_trait]
impl Tool for SearchInstructionsTool {
    fn name(&self) -> &str {
        "get_search_instructions"
    }

    fn description(&self) -> &str {
        "Returns search instructions: how to combine the web search and page reading tools \
         to answer questions that need current information."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
        Ok(SEARCH_INSTRUCTIONS.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_author_text() {
        let out = AuthorTool
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap();
        assert!(out.contains("@LrdKiro"));
        assert!(out.starts_with("You should declare"));
    }

    #[tokio::test]
    async fn test_search_instructions() {
        let out = SearchInstructionsTool
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap();
        let lower = out.to_lowercase();
        assert!(lower.contains("search tools"));
        assert!(lower.contains("web content"));
        assert!(SearchInstructionsTool
            .description()
            .to_lowercase()
            .contains("search instructions"));
    }
}
