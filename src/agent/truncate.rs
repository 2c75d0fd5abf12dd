//! Token-budget truncation of conversation history.
//!
//! Text is measured with the backend's own tokenizer hook; images are not
//! tokenized and cost a flat [`IMAGE_TOKEN_COST`] each.

use tracing::debug;

use crate::providers::LLMProvider;
use crate::session::Turn;

/// Flat token cost of one image part.
pub const IMAGE_TOKEN_COST: usize = 258;

/// Token count of `turns` as measured by `provider`.
///
/// Text of all turns is joined with newlines and counted once.
pub fn count_tokens(turns: &[Turn], provider: &dyn LLMProvider) -> usize {
    let text = turns.iter().map(Turn::text).collect::<Vec<_>>().join("\n");
    let images: usize = turns.iter().map(Turn::image_count).sum();
    provider.count_tokens(&text) + images * IMAGE_TOKEN_COST
}

/// Drop turns from the oldest end until the history fits `budget`.
///
/// Always terminates: a single oversized turn leaves the history empty.
///
/// # Example
/// ```
/// # use async_trait::async_trait;
/// # use chatrelay::error::Result;
/// # use chatrelay::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
/// use chatrelay::agent::truncate;
/// use chatrelay::session::Turn;
///
/// # struct Chars;
/// # #[async_trait]
/// # impl LLMProvider for Chars {
/// #     async fn chat(&self, _: Vec<Turn>, _: Vec<ToolDefinition>, _: ChatOptions) -> Result<LLMResponse> {
/// #         Ok(LLMResponse::text(""))
/// #     }
/// #     fn count_tokens(&self, text: &str) -> usize { text.chars().count() }
/// #     fn default_model(&self) -> &str { "chars" }
/// #     fn name(&self) -> &str { "chars" }
/// # }
/// let history = vec![Turn::human("aaaa"), Turn::human("bbbb")];
/// let kept = truncate(history, &Chars, 4);
/// assert_eq!(kept, vec![Turn::human("bbbb")]);
/// ```
pub fn truncate(mut history: Vec<Turn>, provider: &dyn LLMProvider, budget: usize) -> Vec<Turn> {
    let mut evicted = 0usize;
    while !history.is_empty() && count_tokens(&history, provider) > budget {
        history.remove(0);
        evicted += 1;
    }
    if evicted > 0 {
        debug!(evicted, budget, remaining = history.len(), "History truncated");
    }
    history
}
