//! Conversation types for ChatRelay
//!
//! A [`Conversation`] is an ordered list of [`Turn`]s. Turns are immutable
//! once appended; a conversation only grows at the end or is cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-chat dialogue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id (e.g., "telegram:-1001234")
    pub id: String,
    /// Ordered history, oldest first
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    ///
    /// # Example
    /// ```
    /// use chatrelay::session::Conversation;
    ///
    /// let conversation = Conversation::new("telegram:42");
    /// assert!(conversation.is_empty());
    /// ```
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn at the end.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.updated_at = Utc::now();
    }

    /// Replace the history with a truncated version of itself.
    pub fn replace_turns(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
        self.updated_at = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions, only ever part of the system preamble
    System,
    /// Chat participants
    Human,
    /// The model
    Assistant,
    /// Tool results
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Human => write!(f, "human"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One typed part of a multi-part turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// `data:<mime>;base64,<payload>` URL
    Image { data_url: String },
}

impl ContentPart {
    pub fn text(text: &str) -> Self {
        ContentPart::Text {
            text: text.to_string(),
        }
    }

    /// Image part from a base64 JPEG payload.
    pub fn jpeg_base64(data: &str) -> Self {
        ContentPart::Image {
            data_url: format!("data:image/jpeg;base64,{}", data),
        }
    }
}

/// Turn content: plain text or a short list of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    /// Tool calls requested by an assistant turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Id of the call a tool turn answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    fn with_role(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system turn.
    pub fn system(text: &str) -> Self {
        Self::with_role(Role::System, TurnContent::Text(text.to_string()))
    }

    /// Create a human turn.
    ///
    /// # Example
    /// ```
    /// use chatrelay::session::{Role, Turn};
    ///
    /// let turn = Turn::human("@lolo: hi");
    /// assert_eq!(turn.role, Role::Human);
    /// assert_eq!(turn.text(), "@lolo: hi");
    /// ```
    pub fn human(text: &str) -> Self {
        Self::with_role(Role::Human, TurnContent::Text(text.to_string()))
    }

    /// Create a human turn carrying text plus one base64 JPEG image.
    pub fn human_with_image(text: &str, image_base64: &str) -> Self {
        Self::with_role(
            Role::Human,
            TurnContent::Parts(vec![
                ContentPart::text(text),
                ContentPart::jpeg_base64(image_base64),
            ]),
        )
    }

    /// Create an assistant turn.
    pub fn assistant(text: &str) -> Self {
        Self::with_role(Role::Assistant, TurnContent::Text(text.to_string()))
    }

    /// Create an assistant turn that requests tool calls.
    pub fn assistant_with_tools(text: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut turn = Self::assistant(text);
        turn.tool_calls = Some(tool_calls);
        turn
    }

    /// Create a tool result turn.
    pub fn tool_result(tool_call_id: &str, text: &str) -> Self {
        let mut turn = Self::with_role(Role::Tool, TurnContent::Text(text.to_string()));
        turn.tool_call_id = Some(tool_call_id.to_string());
        turn
    }

    /// Textual parts joined with newlines.
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Base64 payloads of every image part, with the data URL header removed.
    pub fn images(&self) -> Vec<&str> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Image { data_url } => {
                        Some(data_url.split_once(',').map_or(data_url.as_str(), |(_, d)| d))
                    }
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }

    pub fn image_count(&self) -> usize {
        match &self.content {
            TurnContent::Text(_) => 0,
            TurnContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::Image { .. }))
                .count(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}
