//! Inbound filter: decides which chat messages reach the dispatch queue.

use tracing::debug;

use crate::bus::PendingMessage;
use crate::config::BotConfig;

/// Addressing rules for one bot identity.
#[derive(Debug, Clone)]
pub struct InboundFilter {
    bot_name_lower: String,
    bot_username: String,
    group_assistant: bool,
    allowed_chat_ids: Vec<String>,
}

impl InboundFilter {
    pub fn new(bot_name: &str, bot_username: &str) -> Self {
        Self {
            bot_name_lower: bot_name.to_lowercase(),
            bot_username: bot_username.to_string(),
            group_assistant: false,
            allowed_chat_ids: Vec::new(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(&config.name, &config.username)
            .with_group_assistant(config.group_assistant)
            .with_allowed_chats(config.allowed_chat_ids.clone())
    }

    /// Open mode: also accept non-reply messages containing a `?`.
    pub fn with_group_assistant(mut self, enabled: bool) -> Self {
        self.group_assistant = enabled;
        self
    }

    /// Restrict to these chat ids; empty allows every chat.
    pub fn with_allowed_chats(mut self, chat_ids: Vec<String>) -> Self {
        self.allowed_chat_ids = chat_ids;
        self
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    pub fn is_chat_allowed(&self, chat_id: &str) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.iter().any(|id| id == chat_id)
    }

    /// Whether the text names the bot by handle or (case-insensitively) by name.
    pub fn mentions_bot(&self, text: &str) -> bool {
        if text.contains(&format!("@{}", self.bot_username)) {
            return true;
        }
        !self.bot_name_lower.is_empty() && text.to_lowercase().contains(&self.bot_name_lower)
    }

    /// Mentioned by handle or name, or replying to one of the bot's messages.
    pub fn is_addressed(&self, msg: &PendingMessage) -> bool {
        self.mentions_bot(msg.text_or_empty()) || msg.is_reply_to(&self.bot_username)
    }

    /// Whether `msg` should be queued for dispatch.
    ///
    /// # Example
    /// ```
    /// use chatrelay::agent::InboundFilter;
    /// use chatrelay::bus::{PendingMessage, Sender};
    ///
    /// let filter = InboundFilter::new("Kiro", "kiro_bot");
    /// let hello = PendingMessage::new("telegram", "1", "2", Sender::new("3"), Some("hi kiro!"));
    /// let chatter = PendingMessage::new("telegram", "1", "3", Sender::new("3"), Some("lunch?"));
    /// assert!(filter.should_enqueue(&hello));
    /// assert!(!filter.should_enqueue(&chatter));
    /// ```
    pub fn should_enqueue(&self, msg: &PendingMessage) -> bool {
        if !self.is_chat_allowed(&msg.chat_id) {
            debug!(chat_id = %msg.chat_id, "Chat not allowed");
            return false;
        }
        if self.is_addressed(msg) {
            return true;
        }
        let open_question =
            self.group_assistant && !msg.is_reply() && msg.text_or_empty().contains('?');
        if !open_question {
            debug!(message_id = %msg.message_id, "Message ignored, not addressed to the bot");
        }
        open_question
    }
}
