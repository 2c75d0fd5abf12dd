//! Telegram channel implementation
//!
//! Long-polls the Bot API with teloxide, turns text and photo messages into
//! [`PendingMessage`]s and hands them to the bus through the inbound filter.
//! `/flushcontext` is resolved here (addressing and admin rights) and
//! enqueued as a control item for the dispatch loop.
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐
//! │   Telegram API   │ <────── │  TelegramChannel │
//! │                  │ ──────> │   (teloxide)     │
//! └──────────────────┘         └────────┬─────────┘
//!                                       │ WorkItem
//!                                       ▼
//!                              ┌──────────────────┐
//!                              │    MessageBus    │
//!                              └──────────────────┘
//! ```

use async_trait::async_trait;
use base64::Engine as _;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InputFile, MessageId, ParseMode, ReplyParameters, User};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::InboundFilter;
use crate::bus::{
    ChatKind, ImageRef, MessageBus, OutboundMessage, OutboundPayload, PendingMessage,
    ReplyTarget, Sender, WorkItem,
};
use crate::config::BotConfig;
use crate::error::{RelayError, Result};
use crate::log_component;
use crate::utils::string::{chunk_chars, prefix_chars};

use super::{Channel, PlatformClient};

/// Channel name used on the bus and in conversation keys.
pub const TELEGRAM_CHANNEL: &str = "telegram";

/// Telegram's hard limit for a single text message.
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

const FLUSH_COMMAND: &str = "flushcontext";

/// Maximum number of startup connectivity retries before giving up.
const MAX_STARTUP_RETRIES: u32 = 10;
/// Base delay (in seconds) for exponential backoff on startup retries.
const BASE_RETRY_DELAY_SECS: u64 = 2;
/// Maximum delay (in seconds) for exponential backoff on startup retries.
const MAX_RETRY_DELAY_SECS: u64 = 120;

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)(@\w+)").unwrap());

fn channel_err(context: &str, e: impl std::fmt::Display) -> RelayError {
    RelayError::Channel(format!("{}: {}", context, e))
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| RelayError::Channel(format!("Invalid Telegram chat ID: {}", chat_id)))
}

/// Build a Telegram bot client with system proxy detection disabled.
fn build_bot(token: &str) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .no_proxy()
        .build()
        .map_err(|e| channel_err("Failed to build Telegram HTTP client", e))?;
    Ok(Bot::with_client(token.to_string(), client))
}

/// Exponential backoff delay for a startup retry attempt.
fn startup_backoff_delay(attempt: u32) -> Duration {
    let delay_secs = BASE_RETRY_DELAY_SECS
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY_SECS);
    Duration::from_secs(delay_secs)
}

// ============================================================================
// Platform client
// ============================================================================

/// Bot API calls made outside the receive loop.
///
/// Shared by the channel (sending replies) and the dispatch loop (file URLs,
/// typing indicator, admin checks).
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(RelayError::Config("Telegram bot token is empty".into()));
        }
        Ok(Self {
            bot: build_bot(token)?,
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Download URL for a file path returned by `getFile`.
    pub fn file_url(token: &str, file_path: &str) -> String {
        format!("https://api.telegram.org/file/bot{}/{}", token, file_path)
    }

    /// Send a text reply.
    ///
    /// Tries Markdown first with `@handles` escaped. Falls back to plain text
    /// in 4096-character chunks when Markdown is rejected or the text is too
    /// long for one message.
    pub async fn send_text(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> Result<()> {
        if text.chars().count() <= TELEGRAM_MAX_MESSAGE_CHARS {
            let mut request = self
                .bot
                .send_message(chat_id, escape_handles(text))
                .parse_mode(ParseMode::Markdown);
            if let Some(id) = reply_to {
                request = request.reply_parameters(reply_parameters(id));
            }
            match request.await {
                Ok(_) => {
                    debug!(chat_id = chat_id.0, "Sent Markdown reply");
                    return Ok(());
                }
                Err(e) => warn!(
                    chat_id = chat_id.0,
                    error = %e,
                    "Failed to send reply using Markdown, falling back to plain text"
                ),
            }
        }

        for chunk in chunk_chars(text, TELEGRAM_MAX_MESSAGE_CHARS) {
            let mut request = self.bot.send_message(chat_id, chunk);
            if let Some(id) = reply_to {
                request = request.reply_parameters(reply_parameters(id));
            }
            request
                .await
                .map_err(|e| channel_err("Failed to send Telegram message", e))?;
        }
        Ok(())
    }

    /// Send a base64-encoded image as a photo reply.
    pub async fn send_image(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        image_b64: &str,
    ) -> Result<()> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image_b64)
            .map_err(|e| channel_err("Invalid image payload", e))?;
        let mut request = self
            .bot
            .send_photo(chat_id, InputFile::memory(bytes).file_name("image.png"));
        if let Some(id) = reply_to {
            request = request.reply_parameters(reply_parameters(id));
        }
        request
            .await
            .map_err(|e| channel_err("Failed to send Telegram photo", e))?;
        Ok(())
    }
}

fn reply_parameters(id: MessageId) -> ReplyParameters {
    ReplyParameters::new(id).allow_sending_without_reply()
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| channel_err("Failed to resolve Telegram file", e))?;
        Ok(Self::file_url(self.bot.token(), &file.path))
    }

    async fn send_typing(&self, chat_id: &str) -> Result<()> {
        self.bot
            .send_chat_action(parse_chat_id(chat_id)?, ChatAction::Typing)
            .await
            .map_err(|e| channel_err("Failed to send typing action", e))?;
        Ok(())
    }

    async fn is_admin(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let admins = self
            .bot
            .get_chat_administrators(parse_chat_id(chat_id)?)
            .await
            .map_err(|e| channel_err("Failed to list chat administrators", e))?;
        Ok(admins.iter().any(|m| m.user.id.0.to_string() == user_id))
    }
}

// ============================================================================
// Message conversion
// ============================================================================

/// Escape Markdown control characters inside a handle.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape `@handles` that start a word so underscores in usernames don't
/// open italics.
pub fn escape_handles(text: &str) -> String {
    HANDLE_RE
        .replace_all(text, |caps: &Captures| {
            format!("{}{}", &caps[1], escape_markdown(&caps[2]))
        })
        .into_owned()
}

/// Whether `text` is the `/flushcontext` command, optionally `@bot`-qualified.
pub fn is_flush_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|word| word.strip_prefix('/'))
        .map(|cmd| cmd.split('@').next().unwrap_or(cmd))
        .is_some_and(|cmd| cmd == FLUSH_COMMAND)
}

fn sender_from(user: Option<&User>) -> Sender {
    match user {
        Some(user) => {
            let mut sender = Sender::new(&user.id.0.to_string()).with_first_name(&user.first_name);
            if let Some(username) = &user.username {
                sender = sender.with_username(username);
            }
            sender
        }
        None => Sender::new("unknown"),
    }
}

fn chat_kind(msg: &Message) -> ChatKind {
    if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Group
    }
}

/// Largest size of a photo message.
fn photo_of(msg: &Message) -> Option<ImageRef> {
    msg.photo()
        .and_then(|sizes| sizes.last())
        .map(|size| ImageRef::new(&size.file.id.to_string()))
}

fn text_of(msg: &Message) -> Option<&str> {
    msg.text().or_else(|| msg.caption())
}

/// Convert a Telegram message into a pending message.
///
/// Returns `None` for anything that is neither text nor a photo.
pub fn to_pending(msg: &Message) -> Option<PendingMessage> {
    let image = photo_of(msg);
    if msg.text().is_none() && image.is_none() {
        return None;
    }

    let mut pending = PendingMessage::new(
        TELEGRAM_CHANNEL,
        &msg.chat.id.0.to_string(),
        &msg.id.0.to_string(),
        sender_from(msg.from.as_ref()),
        text_of(msg),
    )
    .with_chat_kind(chat_kind(msg));

    if let Some(image) = image {
        pending = pending.with_image(image);
    }
    if let Some(parent) = msg.reply_to_message() {
        let mut target = ReplyTarget::new(sender_from(parent.from.as_ref()), text_of(parent));
        if let Some(image) = photo_of(parent) {
            target = target.with_image(image);
        }
        pending = pending.with_reply_to(target);
    }
    Some(pending)
}

// ============================================================================
// Ingress
// ============================================================================

/// Decides what to do with each converted message.
pub struct Ingress {
    bus: Arc<MessageBus>,
    filter: InboundFilter,
    platform: Arc<dyn PlatformClient>,
}

impl Ingress {
    pub fn new(
        bus: Arc<MessageBus>,
        filter: InboundFilter,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            bus,
            filter,
            platform,
        }
    }

    /// Route one message: flush command, filtered enqueue, or drop.
    ///
    /// Never waits on the dispatch loop; a full queue drops the message.
    pub async fn accept(&self, msg: PendingMessage) {
        log_component!(
            debug,
            "telegram",
            "Received message",
            chat_id = msg.chat_id.as_str(),
            sender = msg.sender.id.as_str(),
            preview = prefix_chars(msg.text_or_empty(), 50).as_str()
        );

        if is_flush_command(msg.text_or_empty()) {
            self.accept_flush(msg).await;
            return;
        }

        if !self.filter.should_enqueue(&msg) {
            return;
        }
        let chat_id = msg.chat_id.clone();
        let sender = msg.sender.id.clone();
        match self.bus.try_publish_inbound(WorkItem::Message(msg)) {
            Ok(()) => log_component!(
                info,
                "telegram",
                "Message queued",
                chat_id = chat_id.as_str(),
                sender = sender.as_str()
            ),
            Err(e) => error!("Failed to enqueue message: {}", e),
        }
    }

    async fn accept_flush(&self, msg: PendingMessage) {
        if !self.filter.is_addressed(&msg) {
            debug!(chat_id = %msg.chat_id, "Flush command not addressed to the bot");
            return;
        }

        let authorized = if msg.chat_kind.is_shared() {
            match self.platform.is_admin(&msg.chat_id, &msg.sender.id).await {
                Ok(is_admin) => is_admin,
                Err(e) => {
                    warn!(chat_id = %msg.chat_id, error = %e, "Admin lookup failed");
                    false
                }
            }
        } else {
            true
        };

        info!(chat_id = %msg.chat_id, authorized, "Flush context requested");
        let item = WorkItem::FlushContext {
            message: msg,
            authorized,
        };
        if let Err(e) = self.bus.try_publish_inbound(item) {
            error!("Failed to enqueue flush request: {}", e);
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Telegram channel using teloxide long polling.
pub struct TelegramChannel {
    config: BotConfig,
    bus: Arc<MessageBus>,
    client: Arc<TelegramClient>,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TelegramChannel {
    pub fn new(config: BotConfig, bus: Arc<MessageBus>, client: Arc<TelegramClient>) -> Self {
        Self {
            config,
            bus,
            client,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
        }
    }

    pub fn bot_config(&self) -> &BotConfig {
        &self.config
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        TELEGRAM_CHANNEL
    }

    /// Spawn the polling task and return immediately.
    async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Telegram channel already running");
            return Ok(());
        }

        info!("Starting Telegram channel");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let bot = self.client.bot().clone();
        let ingress = Arc::new(Ingress::new(
            self.bus.clone(),
            InboundFilter::from_config(&self.config),
            self.client.clone(),
        ));
        let running_clone = Arc::clone(&self.running);

        tokio::spawn(async move {
            let task_result = std::panic::AssertUnwindSafe(async move {
                // Transient startup errors (DNS, network still coming up) are
                // retried; anything else bails on the first attempt.
                let mut attempt: u32 = 0;
                loop {
                    match bot.get_me().await {
                        Ok(me) => {
                            info!(username = ?me.username, "Telegram bot authenticated");
                            break;
                        }
                        Err(e) => {
                            use teloxide::RequestError;

                            let is_transient = matches!(
                                &e,
                                RequestError::Network(_)
                                    | RequestError::Io(_)
                                    | RequestError::RetryAfter(_)
                            );

                            if !is_transient || attempt >= MAX_STARTUP_RETRIES {
                                error!(
                                    "Telegram startup check failed after {} attempt(s): {}",
                                    attempt + 1,
                                    e
                                );
                                return;
                            }

                            let delay = match &e {
                                RequestError::RetryAfter(d) => d.duration(),
                                _ => startup_backoff_delay(attempt),
                            };
                            warn!(
                                "Telegram startup check failed (attempt {}/{}), retrying in {}s: {}",
                                attempt + 1,
                                MAX_STARTUP_RETRIES,
                                delay.as_secs(),
                                e
                            );
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Telegram channel shutdown during startup retry");
                                    return;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                            attempt += 1;
                        }
                    }
                }

                let handler = Update::filter_message().endpoint(
                    |msg: Message, ingress: Arc<Ingress>| async move {
                        if let Some(pending) = to_pending(&msg) {
                            ingress.accept(pending).await;
                        }
                        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                    },
                );

                let mut dispatcher = Dispatcher::builder(bot, handler)
                    .dependencies(dptree::deps![ingress])
                    .build();

                info!("Telegram bot dispatcher started, waiting for messages...");

                tokio::select! {
                    _ = dispatcher.dispatch() => {
                        info!("Telegram dispatcher completed");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Telegram channel shutdown signal received");
                    }
                }
            })
            .catch_unwind()
            .await;

            if task_result.is_err() {
                error!("Telegram polling task panicked");
            }

            running_clone.store(false, Ordering::SeqCst);
            info!("Telegram polling task stopped");
        });

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            info!("Telegram channel already stopped");
            return Ok(());
        }

        info!("Stopping Telegram channel");
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).await.is_err() {
                warn!("Telegram shutdown channel already closed");
            }
        }
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Telegram channel not running, cannot send message");
            return Err(RelayError::Channel(
                "Telegram channel not running".to_string(),
            ));
        }

        let chat_id = parse_chat_id(&msg.chat_id)?;
        let reply_to = msg
            .reply_to
            .as_deref()
            .and_then(|id| id.parse::<i32>().ok())
            .map(MessageId);

        match &msg.payload {
            OutboundPayload::Text(text) => self.client.send_text(chat_id, reply_to, text).await?,
            OutboundPayload::Image(image) => {
                self.client.send_image(chat_id, reply_to, image).await?
            }
        }
        debug!(chat_id = chat_id.0, "Telegram reply delivered");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, chat_id: &str) -> bool {
        self.config.allowed_chat_ids.is_empty()
            || self.config.allowed_chat_ids.iter().any(|id| id == chat_id)
    }
}
