//! Channels module - chat platform adapters
//!
//! A channel receives platform updates, converts them to
//! [`crate::bus::PendingMessage`]s, runs the inbound filter and publishes
//! accepted work to the [`crate::bus::MessageBus`]. The [`ChannelManager`]
//! routes replies from the bus back to the adapter that owns the chat.
//!
//! ```text
//!   Telegram ──> Ingress (filter, /flushcontext) ──> MessageBus (inbound)
//!                                                         │
//!                                                   DispatchEngine
//!                                                         │
//!   Telegram <── ChannelManager <──────────────── MessageBus (outbound)
//! ```
//!
//! [`PlatformClient`] is the narrow seam the dispatch loop uses to reach the
//! platform directly: resolving photo URLs, the typing indicator and admin
//! lookups.

mod manager;
pub mod telegram;
mod types;

pub use manager::ChannelManager;
pub use telegram::{Ingress, TelegramChannel, TelegramClient, TELEGRAM_CHANNEL};
pub use types::{Channel, PlatformClient};
