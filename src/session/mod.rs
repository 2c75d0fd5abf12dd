//! Session module - in-memory conversation state
//!
//! The [`ConversationStore`] maps conversation ids to [`Conversation`]s.
//! It performs no locking of its own: the dispatch engine is its only
//! user and processes one message at a time.
//!
//! # Example
//!
//! ```
//! use chatrelay::session::{ConversationStore, Turn};
//!
//! let mut store = ConversationStore::new();
//! store.append("telegram:42", Turn::human("@lolo: hi"));
//! assert_eq!(store.get_or_create("telegram:42").len(), 1);
//!
//! store.clear("telegram:42");
//! assert!(store.get_or_create("telegram:42").is_empty());
//! ```

pub mod types;

pub use types::{ContentPart, Conversation, Role, ToolCall, Turn, TurnContent};

use std::collections::HashMap;

/// In-memory map of conversations. Nothing is persisted.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a conversation, creating an empty one if absent.
    pub fn get_or_create(&mut self, id: &str) -> &mut Conversation {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation::new(id))
    }

    /// Look up a conversation without creating it.
    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Reset a conversation to empty.
    ///
    /// Idempotent; an unknown id ends up as an empty conversation.
    pub fn clear(&mut self, id: &str) {
        self.get_or_create(id).clear();
    }

    /// Append a turn, creating the conversation if needed.
    pub fn append(&mut self, id: &str, turn: Turn) {
        self.get_or_create(id).push(turn);
    }

    /// Snapshot of a conversation's turns (empty for unknown ids).
    pub fn turns(&self, id: &str) -> Vec<Turn> {
        self.conversations
            .get(id)
            .map(|c| c.turns.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// Number of known conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_lazy() {
        let mut store = ConversationStore::new();
        assert!(!store.contains("a"));
        assert!(store.get("a").is_none());

        store.get_or_create("a");
        assert!(store.contains("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_keeps_order() {
        let mut store = ConversationStore::new();
        store.append("a", Turn::human("one"));
        store.append("a", Turn::assistant("two"));
        store.append("b", Turn::human("other"));

        let turns = store.turns("a");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text(), "one");
        assert_eq!(turns[1].text(), "two");
        assert_eq!(store.turns("b").len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent_and_creates() {
        let mut store = ConversationStore::new();
        store.clear("missing");
        assert!(store.contains("missing"));
        assert!(store.turns("missing").is_empty());

        store.append("missing", Turn::human("x"));
        store.clear("missing");
        store.clear("missing");
        assert!(store.turns("missing").is_empty());
    }

    #[test]
    fn test_clear_only_touches_one_conversation() {
        let mut store = ConversationStore::new();
        store.append("a", Turn::human("keep"));
        store.append("b", Turn::human("drop"));
        store.clear("b");
        assert_eq!(store.turns("a").len(), 1);
        assert!(store.turns("b").is_empty());
    }

    #[test]
    fn test_turns_of_unknown_id() {
        let store = ConversationStore::new();
        assert!(store.turns("nope").is_empty());
        assert!(store.is_empty());
    }
}
