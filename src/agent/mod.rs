//! Agent module - the dispatch and conversation-state engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌─────────────┐
//! │  MessageBus │────>│ DispatchEngine │────>│ LLMProvider │
//! │  (inbound)  │     │                │     │             │
//! └─────────────┘     └────────────────┘     └─────────────┘
//!                       │      │      │
//!                       ▼      ▼      ▼
//!             Conversation   Tool    Image backend,
//!                Store     Registry  content fetcher
//! ```
//!
//! Messages pass the [`InboundFilter`] at ingress, wait in the bus queue,
//! and are processed one at a time by the [`DispatchEngine`]: history
//! append, [`truncate`], model call, optional tool round, [`Directive`]
//! classification, side effect, and finally the assistant turn.

mod context;
mod filter;
mod guard;
mod r#loop;
mod protocol;
mod truncate;

pub use context::{
    flush_denied_prompt, flush_success_prompt, guarded_message, synthesize_turn_text,
    web_content_prompt, Preamble, FLUSH_DENIED_TEXT, FLUSH_SUCCESS_TEXT, PREAMBLE_ACK,
};
pub use filter::InboundFilter;
pub use guard::{GuardLabel, PatternGuard, PromptGuard};
pub use protocol::{
    extract_url, remove_urls, strip_self_mention, strip_think_blocks, Directive,
    ResponseEnvelope, GENERATE_IMAGE, NO_ANSWER, WEBCONTENT_OPINION, WEBCONTENT_RESUME,
};
pub use r#loop::{
    typing_seconds, DispatchEngine, FEEDBACK_MAX_CHARS, NO_ANSWER_GLYPHS, WEB_FAILURE_GLYPH,
};
pub use truncate::{count_tokens, truncate, IMAGE_TOKEN_COST};
