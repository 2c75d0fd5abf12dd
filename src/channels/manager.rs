//! Channel manager for ChatRelay
//!
//! Owns the registered chat adapters, starts and stops them together and
//! runs the outbound dispatcher that routes replies from the bus to the
//! adapter named in each [`OutboundMessage`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;

use super::Channel;

/// How long `stop_all` waits for the outbound dispatcher to drain.
const DISPATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

type ChannelMap = Arc<RwLock<HashMap<String, Box<dyn Channel>>>>;

/// Lifecycle owner for all chat adapters.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chatrelay::bus::MessageBus;
/// use chatrelay::channels::ChannelManager;
///
/// # tokio_test::block_on(async {
/// let manager = ChannelManager::new(Arc::new(MessageBus::new()));
/// assert!(manager.channels().await.is_empty());
/// # })
/// ```
pub struct ChannelManager {
    channels: ChannelMap,
    bus: Arc<MessageBus>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    dispatcher_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            bus,
            shutdown_tx,
            shutdown_rx,
            dispatcher_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Registers a channel under its name, replacing any previous one.
    pub async fn register(&self, channel: Box<dyn Channel>) {
        let name = channel.name().to_string();
        info!("Registering channel: {}", name);
        self.channels.write().await.insert(name, channel);
    }

    /// Names of all registered channels.
    pub async fn channels(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn has_channel(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    /// Starts every channel and spawns the outbound dispatcher.
    ///
    /// A channel that fails to start is logged and skipped.
    pub async fn start_all(&self) -> Result<()> {
        {
            let dispatcher_handle = self.dispatcher_handle.read().await;
            if let Some(ref handle) = *dispatcher_handle {
                if !handle.is_finished() {
                    warn!("Dispatcher already running, skipping start");
                    return Ok(());
                }
            }
        }

        let mut channels = self.channels.write().await;
        for (name, channel) in channels.iter_mut() {
            info!("Starting channel: {}", name);
            if let Err(e) = channel.start().await {
                error!("Failed to start channel {}: {}", name, e);
            }
        }
        drop(channels);

        let _ = self.shutdown_tx.send(false);

        let bus = self.bus.clone();
        let channels_ref = self.channels.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            dispatch_outbound(bus, channels_ref, shutdown_rx).await;
        });
        *self.dispatcher_handle.write().await = Some(handle);

        Ok(())
    }

    /// Stops the dispatcher, then every channel.
    pub async fn stop_all(&self) -> Result<()> {
        info!("Signaling dispatcher to stop");
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.dispatcher_handle.write().await.take() {
            match tokio::time::timeout(DISPATCHER_STOP_TIMEOUT, handle).await {
                Ok(_) => info!("Dispatcher stopped cleanly"),
                Err(_) => warn!("Dispatcher did not stop within timeout"),
            }
        }

        let mut channels = self.channels.write().await;
        for (name, channel) in channels.iter_mut() {
            info!("Stopping channel: {}", name);
            if let Err(e) = channel.stop().await {
                error!("Failed to stop channel {}: {}", name, e);
            }
        }
        Ok(())
    }

    /// Sends directly through a named channel, bypassing the bus.
    pub async fn send(&self, channel_name: &str, msg: OutboundMessage) -> Result<()> {
        let channels = self.channels.read().await;
        match channels.get(channel_name) {
            Some(channel) => channel.send(msg).await,
            None => {
                warn!("Channel not found: {}", channel_name);
                Ok(())
            }
        }
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }
}

/// Route outbound messages from the bus until shutdown or bus close.
///
/// Send failures are logged; they never stop the dispatcher.
async fn dispatch_outbound(
    bus: Arc<MessageBus>,
    channels: ChannelMap,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Outbound dispatcher started");
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Outbound dispatcher received shutdown signal");
                    break;
                }
            }
            msg = bus.consume_outbound() => {
                let Some(msg) = msg else {
                    info!("Outbound channel closed");
                    break;
                };
                let channel_name = msg.channel.clone();
                let channels = channels.read().await;
                match channels.get(&channel_name) {
                    Some(channel) => {
                        if let Err(e) = channel.send(msg).await {
                            error!("Failed to send message to {}: {}", channel_name, e);
                        }
                    }
                    None => warn!("Unknown channel for outbound message: {}", channel_name),
                }
            }
        }
    }
    info!("Outbound dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct RecordingChannel {
        name: String,
        running: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
        fail_sends: bool,
    }

    impl RecordingChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                running: Arc::new(AtomicBool::new(false)),
                sent: Arc::new(Mutex::new(Vec::new())),
                fail_sends: false,
            }
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self) -> Result<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, msg: OutboundMessage) -> Result<()> {
            if self.fail_sends {
                return Err(RelayError::Channel("send refused".into()));
            }
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn is_allowed(&self, _chat_id: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let manager = ChannelManager::new(Arc::new(MessageBus::new()));
        manager
            .register(Box::new(RecordingChannel::new("telegram")))
            .await;

        assert_eq!(manager.channel_count().await, 1);
        assert!(manager.has_channel("telegram").await);
        assert!(!manager.has_channel("discord").await);
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let manager = ChannelManager::new(Arc::new(MessageBus::new()));
        let channel = RecordingChannel::new("telegram");
        let running = channel.running.clone();
        manager.register(Box::new(channel)).await;

        manager.start_all().await.unwrap();
        assert!(running.load(Ordering::SeqCst));

        manager.stop_all().await.unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_outbound_routed_to_named_channel() {
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus.clone());
        let channel = RecordingChannel::new("telegram");
        let sent = channel.sent.clone();
        manager.register(Box::new(channel)).await;
        manager.start_all().await.unwrap();

        bus.publish_outbound(OutboundMessage::text("telegram", "42", "hola"))
            .await
            .unwrap();
        bus.publish_outbound(OutboundMessage::text("nowhere", "42", "lost"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop_all().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].as_text(), Some("hola"));
    }

    #[tokio::test]
    async fn test_send_failure_keeps_dispatcher_alive() {
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus.clone());
        let mut channel = RecordingChannel::new("telegram");
        channel.fail_sends = true;
        manager.register(Box::new(channel)).await;
        manager.start_all().await.unwrap();

        bus.publish_outbound(OutboundMessage::text("telegram", "42", "one"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handle = manager.dispatcher_handle.read().await;
        assert!(handle.as_ref().is_some_and(|h| !h.is_finished()));
        drop(handle);
        manager.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_missing_channel_is_ok() {
        let manager = ChannelManager::new(Arc::new(MessageBus::new()));
        let result = manager
            .send("missing", OutboundMessage::text("missing", "1", "x"))
            .await;
        assert!(result.is_ok());
    }
}
