//! Message types for the ChatRelay message bus
//!
//! Inbound work is a [`WorkItem`]: either a [`PendingMessage`] that passed
//! the inbound filter or an administrative flush request. Outbound traffic
//! is an [`OutboundMessage`] carrying text or an image back to the chat.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of chat a message was posted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Group-like chats where admin rights matter.
    pub fn is_shared(&self) -> bool {
        !matches!(self, ChatKind::Private)
    }
}

/// Identity of a message author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Platform user id
    pub id: String,
    /// Handle without the leading `@`
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl Sender {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_first_name(mut self, first_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self
    }
}

/// Platform reference to a photo, resolved to a download URL at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub file_id: String,
}

impl ImageRef {
    pub fn new(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
        }
    }
}

/// The message a pending message replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub sender: Sender,
    /// Text, or caption for photos
    pub text: Option<String>,
    pub image: Option<ImageRef>,
}

impl ReplyTarget {
    pub fn new(sender: Sender, text: Option<&str>) -> Self {
        Self {
            sender,
            text: text.map(str::to_string),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn is_image(&self) -> bool {
        self.image.is_some()
    }
}

/// A raw inbound unit of work.
///
/// Lives only in the inbound queue; once dequeued it is never re-enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    /// The channel this message came from (e.g., "telegram")
    pub channel: String,
    /// Platform chat id
    pub chat_id: String,
    pub chat_kind: ChatKind,
    /// Platform message id, used as the reply target
    pub message_id: String,
    pub sender: Sender,
    /// Text, or caption for photos
    pub text: Option<String>,
    pub image: Option<ImageRef>,
    pub reply_to: Option<ReplyTarget>,
    /// Conversation key (format: "channel:chat_id")
    pub conversation_id: String,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

impl PendingMessage {
    /// Creates a new text message in a private chat.
    ///
    /// # Example
    /// ```
    /// use chatrelay::bus::{PendingMessage, Sender};
    ///
    /// let msg = PendingMessage::new("telegram", "42", "7", Sender::new("1"), Some("hi"));
    /// assert_eq!(msg.conversation_id, "telegram:42");
    /// ```
    pub fn new(
        channel: &str,
        chat_id: &str,
        message_id: &str,
        sender: Sender,
        text: Option<&str>,
    ) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            chat_kind: ChatKind::Private,
            message_id: message_id.to_string(),
            sender,
            text: text.map(str::to_string),
            image: None,
            reply_to: None,
            conversation_id: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
        }
    }

    pub fn with_chat_kind(mut self, kind: ChatKind) -> Self {
        self.chat_kind = kind;
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_reply_to(mut self, target: ReplyTarget) -> Self {
        self.reply_to = Some(target);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Text or caption, empty when the message has neither.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Whether this message replies to a message written by `bot_username`.
    pub fn is_reply_to(&self, bot_username: &str) -> bool {
        self.reply_to
            .as_ref()
            .and_then(|r| r.sender.username.as_deref())
            .is_some_and(|u| u == bot_username)
    }

    /// Whether this message replies to a photo.
    pub fn is_reply_to_image(&self) -> bool {
        self.reply_to.as_ref().is_some_and(ReplyTarget::is_image)
    }
}

/// One item of work for the dispatch loop.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A chat message addressed to the bot
    Message(PendingMessage),
    /// `/flushcontext`; `authorized` is the result of the platform admin check
    FlushContext {
        message: PendingMessage,
        authorized: bool,
    },
}

impl WorkItem {
    /// The platform message this item answers.
    pub fn message(&self) -> &PendingMessage {
        match self {
            WorkItem::Message(message) => message,
            WorkItem::FlushContext { message, .. } => message,
        }
    }
}

/// Payload of an outgoing reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundPayload {
    Text(String),
    /// Base64 encoded image
    Image(String),
}

/// Represents an outgoing message to be sent via a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat to send to
    pub chat_id: String,
    /// Message id to reply to
    pub reply_to: Option<String>,
    pub payload: OutboundPayload,
}

impl OutboundMessage {
    /// Creates a text message that is not a reply.
    pub fn text(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            reply_to: None,
            payload: OutboundPayload::Text(content.to_string()),
        }
    }

    /// Creates a reply to `msg` in the same chat.
    pub fn reply_to(msg: &PendingMessage, payload: OutboundPayload) -> Self {
        Self {
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            reply_to: Some(msg.message_id.clone()),
            payload,
        }
    }

    /// Text content, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            OutboundPayload::Text(text) => Some(text),
            OutboundPayload::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender::new("7").with_username("lolo").with_first_name("Lolo")
    }

    #[test]
    fn test_pending_message_creation() {
        let msg = PendingMessage::new("telegram", "-100", "55", sender(), Some("Hello"));
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "-100");
        assert_eq!(msg.message_id, "55");
        assert_eq!(msg.conversation_id, "telegram:-100");
        assert_eq!(msg.text_or_empty(), "Hello");
        assert_eq!(msg.chat_kind, ChatKind::Private);
        assert!(!msg.is_reply());
        assert!(!msg.is_image());
    }

    #[test]
    fn test_reply_detection() {
        let bot = Sender::new("99").with_username("kiro_bot");
        let msg = PendingMessage::new("telegram", "1", "2", sender(), Some("thanks"))
            .with_reply_to(ReplyTarget::new(bot, Some("you're welcome")));

        assert!(msg.is_reply());
        assert!(msg.is_reply_to("kiro_bot"));
        assert!(!msg.is_reply_to("other_bot"));
        assert!(!msg.is_reply_to_image());
    }

    #[test]
    fn test_reply_to_image() {
        let target = ReplyTarget::new(sender(), None).with_image(ImageRef::new("file-1"));
        let msg =
            PendingMessage::new("telegram", "1", "2", sender(), Some("what is this?")).with_reply_to(target);
        assert!(msg.is_reply_to_image());
    }

    #[test]
    fn test_chat_kind_shared() {
        assert!(!ChatKind::Private.is_shared());
        assert!(ChatKind::Group.is_shared());
        assert!(ChatKind::Supergroup.is_shared());
        assert!(ChatKind::Channel.is_shared());
    }

    #[test]
    fn test_outbound_reply() {
        let msg = PendingMessage::new("telegram", "1", "2", sender(), Some("hi"));
        let out = OutboundMessage::reply_to(&msg, OutboundPayload::Text("hello".into()));
        assert_eq!(out.chat_id, "1");
        assert_eq!(out.reply_to.as_deref(), Some("2"));
        assert_eq!(out.as_text(), Some("hello"));

        let image = OutboundMessage::reply_to(&msg, OutboundPayload::Image("QUJD".into()));
        assert!(image.as_text().is_none());
    }

    #[test]
    fn test_work_item_message_accessor() {
        let msg = PendingMessage::new("telegram", "1", "2", sender(), Some("/flushcontext"));
        let item = WorkItem::FlushContext {
            message: msg,
            authorized: false,
        };
        assert_eq!(item.message().message_id, "2");
    }
}
