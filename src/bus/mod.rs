//! Message Bus Module
//!
//! The `MessageBus` is the hand-off point between the ingress side (channel
//! adapters running the inbound filter) and the single dispatch loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  Dispatch   │
//! │  (Telegram) │     │  (inbound)  │     │   Engine    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            │ outbound
//!                            ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   Channel   │<────│  MessageBus │
//! │  (Telegram) │     │  (outbound) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! The inbound side is a plain FIFO. Producers never wait on the model:
//! channel handlers use [`MessageBus::try_publish_inbound`] and drop the
//! message with a warning when the queue is full.
//!
//! # Example
//!
//! ```
//! use chatrelay::bus::{MessageBus, PendingMessage, Sender, WorkItem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!
//!     let msg = PendingMessage::new("telegram", "42", "1", Sender::new("7"), Some("hi"));
//!     bus.publish_inbound(WorkItem::Message(msg)).await.unwrap();
//!
//!     if let Some(item) = bus.try_consume_inbound().await {
//!         println!("Received: {}", item.message().text_or_empty());
//!     }
//! }
//! ```

pub mod message;

pub use message::{
    ChatKind, ImageRef, OutboundMessage, OutboundPayload, PendingMessage, ReplyTarget, Sender,
    WorkItem,
};

use crate::error::{RelayError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default buffer size for message channels
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// The central message bus.
///
/// - **Inbound**: work items from channels to the dispatch engine
/// - **Outbound**: replies from the dispatch engine back to channels
pub struct MessageBus {
    inbound_tx: mpsc::Sender<WorkItem>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    /// Creates a new `MessageBus` with the default buffer size of 100.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new `MessageBus` with a custom buffer size.
    ///
    /// # Example
    /// ```
    /// use chatrelay::bus::MessageBus;
    ///
    /// let bus = MessageBus::with_buffer_size(500);
    /// ```
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size.max(1));

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Publishes an inbound work item, waiting for buffer space.
    ///
    /// # Errors
    /// Returns `RelayError::BusClosed` if the receiver has been dropped.
    pub async fn publish_inbound(&self, item: WorkItem) -> Result<()> {
        self.inbound_tx
            .send(item)
            .await
            .map_err(|_| RelayError::BusClosed)
    }

    /// Publishes an inbound work item without waiting.
    ///
    /// # Returns
    /// - `Ok(())` if the item was queued
    /// - `Err(RelayError::BusClosed)` if the channel is closed
    /// - `Err(RelayError::Channel)` if the buffer is full
    pub fn try_publish_inbound(&self, item: WorkItem) -> Result<()> {
        self.inbound_tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RelayError::Channel("inbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => RelayError::BusClosed,
        })
    }

    /// Waits for the next inbound work item.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn consume_inbound(&self) -> Option<WorkItem> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Takes the next inbound work item if one is queued.
    ///
    /// The dispatch loop polls with this and sleeps between empty polls.
    pub async fn try_consume_inbound(&self) -> Option<WorkItem> {
        self.inbound_rx.lock().await.try_recv().ok()
    }

    /// Publishes an outbound message.
    ///
    /// # Errors
    /// Returns `RelayError::BusClosed` if the receiver has been dropped.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| RelayError::BusClosed)
    }

    /// Waits for the next outbound message.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Returns a clone of the outbound sender.
    pub fn outbound_sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound_tx.clone()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the message bus, sharing the same underlying channels.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
        }
    }
}
