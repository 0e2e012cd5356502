//! Message Bus Module
//!
//! The `MessageBus` decouples transport adapters from the agent. It holds two
//! FIFO queues:
//!
//! - **Inbound**: adapters and the scheduler publish, the agent consumes.
//! - **Outbound**: the agent publishes, a dispatcher task hands each message
//!   to every handler subscribed for the message's channel.
//!
//! ```text
//! ┌─────────────┐  publish_inbound  ┌─────────────┐  consume_inbound ┌─────────┐
//! │  Adapter /  │──────────────────>│  MessageBus │─────────────────>│  Agent  │
//! │  Scheduler  │                   │  (inbound)  │                  │         │
//! └─────────────┘                   └─────────────┘                  └────┬────┘
//!                                                                         │
//! ┌─────────────┐     handlers      ┌─────────────┐  publish_outbound     │
//! │   Adapter   │<──────────────────│  dispatcher │<──────────────────────┘
//! └─────────────┘                   └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use femtoclaw::bus::{InboundMessage, MessageBus};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!
//!     let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
//!     bus.publish_inbound(msg).await.unwrap();
//!
//!     if let Some(received) = bus.consume_inbound().await {
//!         println!("Received: {}", received.content);
//!     }
//! }
//! ```

pub mod message;

pub use message::{InboundMessage, MediaAttachment, MediaType, OutboundMessage, SYSTEM_CHANNEL};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{FemtoError, Result};

/// Receives outbound messages for one channel.
///
/// Any `Fn(OutboundMessage) -> impl Future<Output = Result<()>>` closure is a
/// handler, so adapters usually subscribe with a closure that forwards to
/// their own send routine.
#[async_trait]
pub trait OutboundHandler: Send + Sync {
    /// Deliver one message. Errors are logged by the dispatcher and never
    /// retried.
    async fn handle(&self, msg: OutboundMessage) -> Result<()>;
}

#[async_trait]
impl<F, Fut> OutboundHandler for F
where
    F: Fn(OutboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, msg: OutboundMessage) -> Result<()> {
        (self)(msg).await
    }
}

type HandlerList = Vec<Arc<dyn OutboundHandler>>;

#[derive(Clone)]
enum InboundSender {
    Unbounded(mpsc::UnboundedSender<InboundMessage>),
    Bounded(mpsc::Sender<InboundMessage>),
}

enum InboundReceiver {
    Unbounded(mpsc::UnboundedReceiver<InboundMessage>),
    Bounded(mpsc::Receiver<InboundMessage>),
}

impl InboundReceiver {
    async fn recv(&mut self) -> Option<InboundMessage> {
        match self {
            InboundReceiver::Unbounded(rx) => rx.recv().await,
            InboundReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

/// The central message bus for routing messages between adapters and the
/// agent.
///
/// Cloning a `MessageBus` yields another handle onto the same queues and
/// subscriptions.
pub struct MessageBus {
    inbound_tx: InboundSender,
    inbound_rx: Arc<Mutex<InboundReceiver>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<OutboundMessage>>>,
    /// Outbound handlers keyed by channel name, in subscription order
    subscribers: Arc<RwLock<HashMap<String, HandlerList>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl MessageBus {
    /// Creates a bus whose inbound queue is unbounded.
    ///
    /// # Example
    /// ```
    /// use femtoclaw::bus::MessageBus;
    ///
    /// let bus = MessageBus::new();
    /// ```
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_parts(InboundSender::Unbounded(tx), InboundReceiver::Unbounded(rx))
    }

    /// Creates a bus whose inbound queue holds at most `capacity` messages.
    /// Publishers wait for space once it is full; nothing is dropped.
    ///
    /// # Example
    /// ```
    /// use femtoclaw::bus::MessageBus;
    ///
    /// let bus = MessageBus::with_inbound_capacity(500);
    /// ```
    pub fn with_inbound_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self::from_parts(InboundSender::Bounded(tx), InboundReceiver::Bounded(rx))
    }

    /// Builds a bus from the `bus` config section.
    pub fn from_config(config: &crate::config::BusConfig) -> Self {
        match config.inbound_capacity {
            Some(capacity) => Self::with_inbound_capacity(capacity),
            None => Self::new(),
        }
    }

    fn from_parts(inbound_tx: InboundSender, inbound_rx: InboundReceiver) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Publishes an inbound message to the bus.
    ///
    /// On a bounded bus this waits until the queue has room.
    ///
    /// # Errors
    /// Returns `FemtoError::BusClosed` if the receiver has been dropped.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        match &self.inbound_tx {
            InboundSender::Unbounded(tx) => tx.send(msg).map_err(|_| FemtoError::BusClosed),
            InboundSender::Bounded(tx) => tx.send(msg).await.map_err(|_| FemtoError::BusClosed),
        }
    }

    /// Waits for the next inbound message.
    ///
    /// Returns `None` only once every sender is gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Publishes an outbound message to the bus.
    ///
    /// # Errors
    /// Returns `FemtoError::BusClosed` if the receiver has been dropped.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .map_err(|_| FemtoError::BusClosed)
    }

    /// Takes the next outbound message directly, bypassing subscriptions.
    ///
    /// Only useful when no dispatcher is running; with a dispatcher active
    /// the two compete for messages.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Registers `handler` for outbound messages addressed to `channel`.
    ///
    /// Handlers for the same channel run in the order they subscribed.
    ///
    /// # Example
    /// ```
    /// use femtoclaw::bus::{MessageBus, OutboundMessage};
    /// use femtoclaw::error::FemtoError;
    ///
    /// # tokio_test::block_on(async {
    /// let bus = MessageBus::new();
    /// bus.subscribe_outbound("cli", |msg: OutboundMessage| async move {
    ///     println!("{}", msg.content);
    ///     Ok::<(), FemtoError>(())
    /// })
    /// .await;
    /// assert_eq!(bus.subscriber_count("cli").await, 1);
    /// # });
    /// ```
    pub async fn subscribe_outbound<H>(&self, channel: &str, handler: H)
    where
        H: OutboundHandler + 'static,
    {
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(channel.to_string())
            .or_default()
            .push(Arc::new(handler));
        debug!(channel = %channel, "Outbound handler subscribed");
    }

    /// Number of handlers subscribed for `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Hands `msg` to every handler subscribed for its channel, in
    /// subscription order, and returns how many handlers were invoked.
    ///
    /// With no subscriber the message is logged as undeliverable and dropped.
    pub async fn dispatch_outbound(&self, msg: OutboundMessage) -> usize {
        // Snapshot the list so no lock is held while handlers run.
        let handlers: HandlerList = self
            .subscribers
            .read()
            .await
            .get(&msg.channel)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            warn!(
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                "Undeliverable outbound message: no handler subscribed, dropping"
            );
            return 0;
        }

        for handler in &handlers {
            if let Err(e) = handler.handle(msg.clone()).await {
                error!(
                    channel = %msg.channel,
                    chat_id = %msg.chat_id,
                    error = %e,
                    "Outbound handler failed"
                );
            }
        }
        handlers.len()
    }

    /// Spawns the outbound dispatcher.
    ///
    /// The task drains the outbound queue until [`MessageBus::stop_dispatcher`]
    /// is called, then delivers whatever is already queued and exits.
    pub fn start_dispatcher(&self) -> JoinHandle<()> {
        let bus = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("Outbound dispatcher started");

        tokio::spawn(async move {
            let mut outbound_rx = bus.outbound_rx.lock().await;
            loop {
                tokio::select! {
                    biased;
                    maybe_msg = outbound_rx.recv() => {
                        match maybe_msg {
                            Some(msg) => {
                                bus.dispatch_outbound(msg).await;
                            }
                            None => break,
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            while let Ok(msg) = outbound_rx.try_recv() {
                                bus.dispatch_outbound(msg).await;
                            }
                            break;
                        }
                    }
                }
            }
            info!("Outbound dispatcher stopped");
        })
    }

    /// Signals the dispatcher task to finish.
    pub fn stop_dispatcher(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            subscribers: Arc::clone(&self.subscribers),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn recorder(
        log: Arc<std::sync::Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(OutboundMessage) -> std::future::Ready<Result<()>> + Send + Sync {
        move |msg: OutboundMessage| {
            log.lock()
                .unwrap()
                .push(format!("{}:{}", tag, msg.content));
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_bus_inbound_fifo() {
        let bus = MessageBus::new();
        for i in 0..5 {
            bus.publish_inbound(InboundMessage::new("test", "u", "c", &format!("m{}", i)))
                .await
                .unwrap();
        }
        for i in 0..5 {
            let msg = bus.consume_inbound().await.unwrap();
            assert_eq!(msg.content, format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn test_bounded_bus_blocks_instead_of_dropping() {
        let bus = MessageBus::with_inbound_capacity(1);
        bus.publish_inbound(InboundMessage::new("t", "u", "c", "first"))
            .await
            .unwrap();

        let producer = bus.clone();
        let pending = tokio::spawn(async move {
            producer
                .publish_inbound(InboundMessage::new("t", "u", "c", "second"))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(bus.consume_inbound().await.unwrap().content, "first");
        pending.await.unwrap().unwrap();
        assert_eq!(bus.consume_inbound().await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let bus = MessageBus::new();
        let mut tasks = Vec::new();
        for p in 0..4 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    bus.publish_inbound(InboundMessage::new(
                        "t",
                        "u",
                        &format!("p{}", p),
                        &i.to_string(),
                    ))
                    .await
                    .unwrap();
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let mut last_seen: HashMap<String, i32> = HashMap::new();
        for _ in 0..100 {
            let msg = bus.consume_inbound().await.unwrap();
            let n: i32 = msg.content.parse().unwrap();
            let prev = last_seen.insert(msg.chat_id.clone(), n);
            assert!(prev.map_or(true, |p| p < n), "per-producer order broken");
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_subscription_order() {
        let bus = MessageBus::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.subscribe_outbound("tg", recorder(log.clone(), "a")).await;
        bus.subscribe_outbound("tg", recorder(log.clone(), "b")).await;
        bus.subscribe_outbound("slack", recorder(log.clone(), "s")).await;

        let delivered = bus
            .dispatch_outbound(OutboundMessage::new("tg", "1", "hello"))
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:hello", "b:hello"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_subscriber_drops() {
        let bus = MessageBus::new();
        let delivered = bus
            .dispatch_outbound(OutboundMessage::new("nowhere", "1", "lost"))
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let bus = MessageBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe_outbound("tg", |_msg: OutboundMessage| async move {
            Err::<(), FemtoError>(FemtoError::Channel("transport down".into()))
        })
        .await;
        let counter = calls.clone();
        bus.subscribe_outbound("tg", move |_msg: OutboundMessage| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), FemtoError>(())
            }
        })
        .await;

        bus.dispatch_outbound(OutboundMessage::new("tg", "1", "x")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_task_delivers_in_order() {
        let bus = MessageBus::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.subscribe_outbound("cli", recorder(log.clone(), "cli")).await;

        let handle = bus.start_dispatcher();
        for i in 0..10 {
            bus.publish_outbound(OutboundMessage::new("cli", "c", &i.to_string()))
                .await
                .unwrap();
        }
        bus.stop_dispatcher();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher should stop")
            .unwrap();

        let expected: Vec<String> = (0..10).map(|i| format!("cli:{}", i)).collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_consume_outbound_without_dispatcher() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("cli", "c", "direct"))
            .await
            .unwrap();
        assert_eq!(bus.consume_outbound().await.unwrap().content, "direct");
    }
}
