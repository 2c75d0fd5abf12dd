//! Dispatch engine: the single consumer of the inbound queue.
//!
//! Each work item runs to completion before the next one is taken, so at
//! most one model call is in flight for the whole process and the
//! conversation store is only ever touched by one cycle at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{MessageBus, OutboundMessage, OutboundPayload, PendingMessage, WorkItem};
use crate::channels::PlatformClient;
use crate::config::{Config, FallbackStrategy};
use crate::error::{RelayError, Result};
use crate::media::{HttpImageDownloader, ImageBackend, ImageDownloader, StableDiffusionBackend};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{ConversationStore, ToolCall, Turn};
use crate::tools::{ContentFetcher, FetchError, HttpContentFetcher, ToolContext, ToolRegistry};
use crate::utils::string::truncate_with_ellipsis;

use super::context::{
    flush_denied_prompt, flush_success_prompt, guarded_message, synthesize_turn_text,
    web_content_prompt, web_failure_prompt, Preamble, FLUSH_DENIED_TEXT, FLUSH_SUCCESS_TEXT,
};
use super::guard::{PatternGuard, PromptGuard};
use super::protocol::{
    extract_url, strip_self_mention, strip_think_blocks, Directive, ResponseEnvelope, NO_ANSWER,
};
use super::truncate::truncate;

/// Glyphs sent for a no-answer under the glyph strategy.
pub const NO_ANSWER_GLYPHS: &[&str] = &["😐", "😶", "😳", "😕", "😑"];

/// Glyph sent for a failed web content request under the glyph strategy.
pub const WEB_FAILURE_GLYPH: &str = "😐";

/// Feedback messages are cut to this many characters.
pub const FEEDBACK_MAX_CHARS: usize = 200;

/// Typing indicator refresh interval during typing simulation.
const TYPING_REFRESH: Duration = Duration::from_secs(5);

/// How the model is called for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputKind {
    /// Photo attached to the message itself
    Image(String),
    /// Reply to a photo
    ReplyToImage(String),
    Text,
}

/// The dispatch engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(DispatchEngine::new(config, bus, provider, platform)
///     .with_tools(registry));
/// let runner = Arc::clone(&engine);
/// tokio::spawn(async move { runner.start().await });
/// // ...
/// engine.stop();
/// ```
pub struct DispatchEngine {
    config: Config,
    bus: Arc<MessageBus>,
    provider: Arc<dyn LLMProvider>,
    platform: Arc<dyn PlatformClient>,
    tools: ToolRegistry,
    store: Mutex<ConversationStore>,
    preamble: Preamble,
    images: Option<Box<dyn ImageBackend>>,
    fetcher: Box<dyn ContentFetcher>,
    downloader: Box<dyn ImageDownloader>,
    guard: Option<Box<dyn PromptGuard>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl DispatchEngine {
    /// Create an engine with the HTTP collaborators described by `config`
    /// and an empty tool registry.
    pub fn new(
        config: Config,
        bus: Arc<MessageBus>,
        provider: Box<dyn LLMProvider>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let images = StableDiffusionBackend::from_config(&config.image)
            .map(|backend| Box::new(backend) as Box<dyn ImageBackend>);
        let guard = config
            .dispatch
            .prompt_guardian
            .then(|| Box::new(PatternGuard::new()) as Box<dyn PromptGuard>);
        Self {
            preamble: Preamble::from_config(&config),
            fetcher: Box::new(HttpContentFetcher::from_config(&config.fetch)),
            downloader: Box::new(HttpImageDownloader::from_config(&config.fetch)),
            images,
            guard,
            config,
            bus,
            provider: Arc::from(provider),
            platform,
            tools: ToolRegistry::new(),
            store: Mutex::new(ConversationStore::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_image_backend(mut self, backend: Option<Box<dyn ImageBackend>>) -> Self {
        self.images = backend;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_downloader(mut self, downloader: Box<dyn ImageDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_guard(mut self, guard: Option<Box<dyn PromptGuard>>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_preamble(mut self, preamble: Preamble) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Snapshot of a conversation's stored history.
    pub async fn history(&self, conversation_id: &str) -> Vec<Turn> {
        self.store.lock().await.turns(conversation_id)
    }

    /// Whether a conversation exists in the store.
    pub async fn has_conversation(&self, conversation_id: &str) -> bool {
        self.store.lock().await.contains(conversation_id)
    }

    /// Run the dispatch loop until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::Config("Dispatch engine already running".into()));
        }
        info!(
            provider = self.provider.name(),
            model = self.provider.default_model(),
            tools = self.tools.len(),
            "Starting dispatch engine"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();
        let idle = Duration::from_millis(self.config.dispatch.idle_poll_ms.max(1));

        while self.running.load(Ordering::SeqCst) {
            match self.bus.try_consume_inbound().await {
                Some(item) => self.dispatch(item).await,
                None => {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                info!("Received shutdown signal");
                                break;
                            }
                        }
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Dispatch engine stopped");
        Ok(())
    }

    /// Ask the loop to stop after the current item.
    pub fn stop(&self) {
        info!("Stopping dispatch engine");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    /// Process one work item and publish its reply, if any.
    pub async fn dispatch(&self, item: WorkItem) {
        let msg = item.message().clone();
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            conversation = %msg.conversation_id,
            chat_id = %msg.chat_id,
            message_id = %msg.message_id,
        );

        async {
            let started = Instant::now();
            let envelope = self.process(item).await;
            let kind = envelope.as_ref().map_or("none", ResponseEnvelope::kind);

            if let Some(envelope) = envelope {
                if let ResponseEnvelope::Text(text) = &envelope {
                    if self.config.dispatch.simulate_typing {
                        self.simulate_typing(&msg.chat_id, text, started).await;
                    }
                }
                self.deliver(&msg, envelope).await;
            }
            info!(
                latency_ms = started.elapsed().as_millis() as u64,
                envelope = kind,
                "Dispatch completed"
            );
        }
        .instrument(span)
        .await;
    }

    /// Produce the response envelope for one work item without publishing it.
    ///
    /// `None` means the cycle failed and the conversation was cleared.
    pub async fn process(&self, item: WorkItem) -> Option<ResponseEnvelope> {
        match item {
            WorkItem::Message(msg) => match self.run_cycle(&msg).await {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    error!(error = %e, "Dispatch cycle failed, clearing conversation");
                    self.store.lock().await.clear(&msg.conversation_id);
                    None
                }
            },
            WorkItem::FlushContext {
                message,
                authorized,
            } => Some(self.flush_context(&message, authorized).await),
        }
    }

    async fn run_cycle(&self, msg: &PendingMessage) -> Result<ResponseEnvelope> {
        if let Err(e) = self.platform.send_typing(&msg.chat_id).await {
            debug!(error = %e, "Failed to send typing action");
        }

        let conversation_id = msg.conversation_id.as_str();
        let turn_text = synthesize_turn_text(msg, &self.config.bot.username);
        let input = self.classify_input(msg);

        let stored_text = match input {
            InputKind::Text if self.is_flagged(msg.text_or_empty()) => {
                guarded_message(msg.text_or_empty())
            }
            _ => turn_text.clone(),
        };
        let stored_turn = Turn::human(&stored_text);

        let history = {
            let mut store = self.store.lock().await;
            store.append(conversation_id, stored_turn.clone());
            let conversation = store.get_or_create(conversation_id);
            let kept = truncate(
                conversation.turns.clone(),
                self.provider.as_ref(),
                self.config.dispatch.context_max_tokens,
            );
            conversation.replace_turns(kept.clone());
            kept
        };

        let ctx = ToolContext::new().with_channel(&msg.channel, &msg.chat_id);
        let reply = match input {
            InputKind::Image(file_id) | InputKind::ReplyToImage(file_id) => {
                let url = self.platform.resolve_file_url(&file_id).await?;
                let mut turns = history;
                if turns.last() == Some(&stored_turn) {
                    turns.pop();
                }
                self.answer_image(turns, &turn_text, &url, &ctx).await?
            }
            InputKind::Text => self.invoke(history, &ctx).await?,
        };
        debug!(reply_len = reply.len(), "Model replied");

        let envelope = self.side_effect(msg, &reply).await;

        self.store
            .lock()
            .await
            .append(conversation_id, Turn::assistant(&reply));
        Ok(envelope)
    }

    fn classify_input(&self, msg: &PendingMessage) -> InputKind {
        if !self.config.bot.multimodal {
            return InputKind::Text;
        }
        if let Some(image) = &msg.image {
            return InputKind::Image(image.file_id.clone());
        }
        match msg.reply_to.as_ref().and_then(|parent| parent.image.as_ref()) {
            Some(image) => InputKind::ReplyToImage(image.file_id.clone()),
            None => InputKind::Text,
        }
    }

    fn is_flagged(&self, text: &str) -> bool {
        let Some(guard) = &self.guard else {
            return false;
        };
        let label = guard.classify(text);
        debug!(label = label.as_str(), "Prompt guard verdict");
        label.is_unsafe()
    }

    /// Multimodal call. Download and model failures become `NO_ANSWER`;
    /// unknown or malformed tool calls still fail the cycle.
    async fn answer_image(
        &self,
        history: Vec<Turn>,
        text: &str,
        url: &str,
        ctx: &ToolContext,
    ) -> Result<String> {
        let image = match self.downloader.download_base64(url).await {
            Ok(image) => image,
            Err(e) => {
                error!(error = %e, "Failed to get image: {}", url);
                return Ok(NO_ANSWER.to_string());
            }
        };

        let mut turns = history;
        turns.push(Turn::human_with_image(text, &image));
        match self.invoke(turns, ctx).await {
            Ok(reply) => Ok(reply),
            Err(e @ (RelayError::UnknownTool(_) | RelayError::MalformedToolCall(_))) => Err(e),
            Err(e) => {
                error!(error = %e, "Image message failed");
                Ok(NO_ANSWER.to_string())
            }
        }
    }

    /// Preamble plus history to the model, with at most one tool round.
    async fn invoke(&self, history: Vec<Turn>, ctx: &ToolContext) -> Result<String> {
        let mut turns = self.preamble.turns();
        turns.extend(history);

        let tools = self.tools.definitions();
        let response = self
            .provider
            .chat(turns.clone(), tools.clone(), ChatOptions::new())
            .await?;

        if !response.has_tool_calls() || self.tools.is_empty() {
            return Ok(response.content);
        }

        turns.push(response.to_turn());
        for call in &response.tool_calls {
            let args = parse_tool_arguments(call)?;
            info!(tool = %call.name, id = %call.id, "Executing tool");
            let result = self
                .tools
                .execute_with_context(&call.name, args, ctx)
                .await?;
            turns.push(Turn::tool_result(&call.id, &result));
        }

        let followup = self
            .provider
            .chat(turns, tools, ChatOptions::new())
            .await?;
        if followup.has_tool_calls() {
            warn!(
                requested = followup.tool_calls.len(),
                "Model requested another tool round, ignoring"
            );
        }
        Ok(followup.content)
    }

    async fn side_effect(&self, msg: &PendingMessage, reply: &str) -> ResponseEnvelope {
        let directive = Directive::classify(reply);
        debug!(directive = directive.name(), "Reply classified");

        match directive {
            Directive::GenerateImage(prompt) => {
                let Some(backend) = &self.images else {
                    debug!("No image backend configured");
                    return ResponseEnvelope::Silent;
                };
                match backend.generate(&prompt).await {
                    Some(image) => ResponseEnvelope::Image(image),
                    None => ResponseEnvelope::Silent,
                }
            }
            Directive::WebResume | Directive::WebOpinion => {
                let text = self.answer_web_content(msg.text_or_empty(), reply).await;
                ResponseEnvelope::Text(strip_think_blocks(&text).trim().to_string())
            }
            Directive::NoAnswer => match self.config.dispatch.fallback {
                FallbackStrategy::Feedback => ResponseEnvelope::Silent,
                FallbackStrategy::Glyph => {
                    let glyph = NO_ANSWER_GLYPHS
                        .choose(&mut rand::thread_rng())
                        .copied()
                        .unwrap_or(WEB_FAILURE_GLYPH);
                    ResponseEnvelope::Text(glyph.to_string())
                }
            },
            Directive::Plain => {
                let cleaned = strip_think_blocks(reply);
                let cleaned = strip_self_mention(&self.config.bot.username, cleaned.trim());
                if cleaned.trim().is_empty() {
                    debug!("Empty reply after cleanup");
                    ResponseEnvelope::Silent
                } else {
                    ResponseEnvelope::Text(cleaned)
                }
            }
        }
    }

    /// Fetch the page linked in the model's reply and summarize it.
    ///
    /// Never fails: any problem yields an apology.
    async fn answer_web_content(&self, user_text: &str, reply: &str) -> String {
        match self.summarize_linked_page(user_text, reply).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = e.url(), error = %e, "Web content request failed");
                self.fallback_text(&e.apology(), WEB_FAILURE_GLYPH, |lang, apology| {
                    web_failure_prompt(lang, apology)
                })
                .await
            }
        }
    }

    async fn summarize_linked_page(
        &self,
        user_text: &str,
        reply: &str,
    ) -> std::result::Result<String, FetchError> {
        let url = extract_url(reply).ok_or_else(|| FetchError::other("", "no URL in reply"))?;
        debug!(url, "Obtaining web content");
        let page = self.fetcher.fetch_text(url).await?;
        let prompt = web_content_prompt(user_text, &page);
        self.provider
            .chat(vec![Turn::human(&prompt)], Vec::new(), ChatOptions::new())
            .await
            .map(|response| response.content)
            .map_err(|e| FetchError::other(url, e.to_string()))
    }

    /// One-turn model call for short user-facing notices.
    ///
    /// The reply is trimmed and cut to [`FEEDBACK_MAX_CHARS`].
    pub async fn generate_feedback(&self, prompt: &str) -> Result<String> {
        debug!("Generating feedback message");
        let response = self
            .provider
            .chat(vec![Turn::human(prompt)], Vec::new(), ChatOptions::new())
            .await?;
        Ok(truncate_with_ellipsis(
            response.content.trim(),
            FEEDBACK_MAX_CHARS,
        ))
    }

    /// Text for a failure notice according to the fallback strategy.
    async fn fallback_text<F>(&self, static_text: &str, glyph: &str, prompt: F) -> String
    where
        F: Fn(&str, &str) -> String,
    {
        match self.config.dispatch.fallback {
            FallbackStrategy::Glyph => glyph.to_string(),
            FallbackStrategy::Feedback => {
                let prompt = prompt(&self.config.bot.preferred_language, static_text);
                match self.generate_feedback(&prompt).await {
                    Ok(text) if !text.is_empty() => text,
                    Ok(_) => static_text.to_string(),
                    Err(e) => {
                        error!(error = %e, "Failed to generate feedback message");
                        static_text.to_string()
                    }
                }
            }
        }
    }

    async fn flush_context(&self, msg: &PendingMessage, authorized: bool) -> ResponseEnvelope {
        if !authorized {
            debug!(user = %msg.sender.id, "Flush refused, sender is not an admin");
            let text = self
                .flush_notice(FLUSH_DENIED_TEXT, |lang, _| flush_denied_prompt(lang))
                .await;
            return ResponseEnvelope::Text(text);
        }

        self.store.lock().await.clear(&msg.conversation_id);
        info!("Chat context flushed");
        let text = self
            .flush_notice(FLUSH_SUCCESS_TEXT, |lang, _| flush_success_prompt(lang))
            .await;
        ResponseEnvelope::Text(text)
    }

    async fn flush_notice<F>(&self, static_text: &str, prompt: F) -> String
    where
        F: Fn(&str, &str) -> String,
    {
        // Flush notices fall back to the static text, never to a glyph.
        self.fallback_text(static_text, static_text, prompt).await
    }

    async fn deliver(&self, msg: &PendingMessage, envelope: ResponseEnvelope) {
        let payload = match envelope {
            ResponseEnvelope::Text(text) => OutboundPayload::Text(text),
            ResponseEnvelope::Image(image) => OutboundPayload::Image(image),
            ResponseEnvelope::Silent => return,
        };
        if let Err(e) = self
            .bus
            .publish_outbound(OutboundMessage::reply_to(msg, payload))
            .await
        {
            error!(error = %e, "Failed to publish reply");
        }
    }

    /// Keep the typing indicator up for roughly the time a person would
    /// need to type `text`, minus the time already spent.
    async fn simulate_typing(&self, chat_id: &str, text: &str, started: Instant) {
        let mut left = typing_seconds(text, self.config.dispatch.typing_wpm)
            - started.elapsed().as_secs_f64();
        left = left.min(self.config.dispatch.typing_max_secs);
        debug!(seconds = left, "Simulating typing");

        while left > 0.0 {
            if let Err(e) = self.platform.send_typing(chat_id).await {
                debug!(error = %e, "Failed to send typing action");
            }
            let step = TYPING_REFRESH.as_secs_f64().min(left);
            tokio::time::sleep(Duration::from_secs_f64(step)).await;
            left -= TYPING_REFRESH.as_secs_f64();
        }
    }
}

/// Seconds needed to type `text` at `wpm` words per minute.
pub fn typing_seconds(text: &str, wpm: f64) -> f64 {
    if wpm <= 0.0 {
        return 0.0;
    }
    text.split_whitespace().count() as f64 * 60.0 / wpm
}

/// Tool arguments must be a JSON object; an empty string means no arguments.
fn parse_tool_arguments(call: &ToolCall) -> Result<serde_json::Value> {
    if call.arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str::<serde_json::Value>(&call.arguments) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(RelayError::MalformedToolCall(format!(
            "{}: arguments are not an object",
            call.name
        ))),
        Err(e) => Err(RelayError::MalformedToolCall(format!("{}: {}", call.name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: "multiply".into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn test_parse_tool_arguments() {
        let args = parse_tool_arguments(&call(r#"{"first_int": 2, "second_int": 3}"#)).unwrap();
        assert_eq!(args["first_int"], 2);
        assert_eq!(parse_tool_arguments(&call("")).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_malformed_tool_arguments() {
        let err = parse_tool_arguments(&call("[1, 2]")).unwrap_err();
        assert!(matches!(err, RelayError::MalformedToolCall(_)));
        let err = parse_tool_arguments(&call("{not json")).unwrap_err();
        assert!(matches!(err, RelayError::MalformedToolCall(_)));
    }

    #[test]
    fn test_typing_seconds() {
        assert_eq!(typing_seconds("one two three four five", 50.0), 6.0);
        assert_eq!(typing_seconds("", 50.0), 0.0);
        assert_eq!(typing_seconds("words", 0.0), 0.0);
    }
}
