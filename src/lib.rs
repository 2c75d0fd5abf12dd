//! ChatRelay - conversational relay between group chats and a language model
//!
//! Messages arrive through a [`channels::Channel`], pass the
//! [`agent::InboundFilter`] and wait in the [`bus::MessageBus`] until the
//! single [`agent::DispatchEngine`] processes them strictly in arrival order.

pub mod agent;
pub mod bus;
pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::DispatchEngine;
pub use bus::{MessageBus, OutboundMessage, PendingMessage, WorkItem};
pub use config::Config;
pub use error::{RelayError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
pub use session::{ConversationStore, Turn};
