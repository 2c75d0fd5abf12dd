//! Channel types for ChatRelay
//!
//! This module defines the [`Channel`] trait that chat adapters implement
//! and the [`PlatformClient`] seam the dispatch loop uses for the few
//! platform calls it makes outside of sending replies.

use async_trait::async_trait;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// The `Channel` trait defines the interface for chat adapters.
///
/// A channel receives platform updates, runs them through the inbound filter
/// and publishes accepted work to the bus. Replies produced by the dispatch
/// loop come back through [`Channel::send`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns the name of this channel (e.g., "telegram")
    fn name(&self) -> &str;

    /// Starts receiving updates.
    ///
    /// Returns once the receive loop is spawned; it keeps running in the
    /// background until [`Channel::stop`] is called.
    async fn start(&mut self) -> Result<()>;

    /// Stops the receive loop.
    async fn stop(&mut self) -> Result<()>;

    /// Delivers a reply to the chat it addresses.
    async fn send(&self, msg: OutboundMessage) -> Result<()>;

    /// Returns whether the receive loop is running.
    fn is_running(&self) -> bool;

    /// Returns whether the given chat may talk to the bot.
    fn is_allowed(&self, chat_id: &str) -> bool;
}

/// Platform calls the dispatch loop makes while processing a message.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Resolve a platform file id to a downloadable URL.
    async fn resolve_file_url(&self, file_id: &str) -> Result<String>;

    /// Show the "typing..." indicator in a chat.
    async fn send_typing(&self, chat_id: &str) -> Result<()>;

    /// Whether `user_id` administers `chat_id`.
    async fn is_admin(&self, chat_id: &str, user_id: &str) -> Result<bool>;
}
