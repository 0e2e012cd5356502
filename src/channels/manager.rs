//! Channel Manager for femtoclaw
//!
//! Registers adapters as outbound subscribers on the bus and owns the
//! dispatcher task that delivers replies to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::{FemtoError, Result};

use super::Channel;

/// Manages the lifecycle of all transport adapters.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use femtoclaw::bus::MessageBus;
/// use femtoclaw::channels::ChannelManager;
///
/// # tokio_test::block_on(async {
/// let manager = ChannelManager::new(Arc::new(MessageBus::new()));
/// assert!(manager.channels().await.is_empty());
/// # })
/// ```
pub struct ChannelManager {
    channels: Arc<RwLock<HashMap<String, Arc<dyn Channel>>>>,
    bus: Arc<MessageBus>,
    dispatcher_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            bus,
            dispatcher_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Register `channel` and subscribe it to outbound messages addressed to
    /// its name.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel with the same name is already
    /// registered.
    pub async fn register(&self, channel: Arc<dyn Channel>) -> Result<()> {
        let name = channel.name().to_string();
        {
            let mut channels = self.channels.write().await;
            if channels.contains_key(&name) {
                return Err(FemtoError::Channel(format!(
                    "Channel '{}' is already registered",
                    name
                )));
            }
            channels.insert(name.clone(), Arc::clone(&channel));
        }

        self.bus
            .subscribe_outbound(&name, move |msg: OutboundMessage| {
                let channel = Arc::clone(&channel);
                async move { channel.send(msg).await }
            })
            .await;
        info!(channel = %name, "Registered channel");
        Ok(())
    }

    /// Registered channel names, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn has_channel(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    /// Start every channel and the outbound dispatcher.
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

        for (name, channel) in self.snapshot().await {
            info!(channel = %name, "Starting channel");
            if let Err(e) = channel.start().await {
                error!(channel = %name, error = %e, "Failed to start channel");
            }
        }

        *self.dispatcher_handle.write().await = Some(self.bus.start_dispatcher());
        Ok(())
    }

    /// Stop the dispatcher, delivering what is already queued, then stop
    /// every channel.
    pub async fn stop_all(&self) -> Result<()> {
        self.bus.stop_dispatcher();
        if let Some(handle) = self.dispatcher_handle.write().await.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(_) => info!("Dispatcher stopped cleanly"),
                Err(_) => warn!("Dispatcher did not stop within timeout"),
            }
        }

        for (name, channel) in self.snapshot().await {
            info!(channel = %name, "Stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "Failed to stop channel");
            }
        }
        Ok(())
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    /// Copy of the channel map so no lock is held across channel calls.
    async fn snapshot(&self) -> Vec<(String, Arc<dyn Channel>)> {
        self.channels
            .read()
            .await
            .iter()
            .map(|(name, channel)| (name.clone(), Arc::clone(channel)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockChannel {
        name: String,
        running: AtomicBool,
        sent: StdMutex<Vec<String>>,
        fail_start: bool,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                running: AtomicBool::new(false),
                sent: StdMutex::new(Vec::new()),
                fail_start: false,
            }
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(FemtoError::Channel("no token".into()));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, msg: OutboundMessage) -> Result<()> {
            self.sent.lock().unwrap().push(msg.content);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_register_subscribes_to_bus() {
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus.clone());
        manager
            .register(Arc::new(MockChannel::new("test")))
            .await
            .unwrap();

        assert!(manager.has_channel("test").await);
        assert_eq!(manager.channel_count().await, 1);
        assert_eq!(bus.subscriber_count("test").await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_register_rejected() {
        let manager = ChannelManager::new(Arc::new(MessageBus::new()));
        manager.register(Arc::new(MockChannel::new("a"))).await.unwrap();
        assert!(manager.register(Arc::new(MockChannel::new("a"))).await.is_err());
    }

    #[tokio::test]
    async fn test_start_stop_and_delivery() {
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus.clone());
        let channel = Arc::new(MockChannel::new("mock"));
        let failing = Arc::new(MockChannel {
            fail_start: true,
            ..MockChannel::new("broken")
        });
        manager.register(channel.clone()).await.unwrap();
        manager.register(failing.clone()).await.unwrap();

        manager.start_all().await.unwrap();
        assert!(channel.is_running());
        assert!(!failing.is_running());

        bus.publish_outbound(OutboundMessage::new("mock", "c", "one"))
            .await
            .unwrap();
        bus.publish_outbound(OutboundMessage::new("mock", "c", "two"))
            .await
            .unwrap();

        manager.stop_all().await.unwrap();
        assert!(!channel.is_running());
        assert_eq!(*channel.sent.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_channels_sorted() {
        let manager = ChannelManager::new(Arc::new(MessageBus::new()));
        manager.register(Arc::new(MockChannel::new("zulip"))).await.unwrap();
        manager.register(Arc::new(MockChannel::new("cli"))).await.unwrap();
        assert_eq!(manager.channels().await, vec!["cli", "zulip"]);
    }
}
