//! Channel trait for femtoclaw transport adapters
//!
//! An adapter publishes what it receives with
//! [`MessageBus::publish_inbound`](crate::bus::MessageBus::publish_inbound)
//! and is handed replies through [`Channel::send`] once registered with a
//! [`ChannelManager`](super::ChannelManager).

use async_trait::async_trait;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// The interface every transport adapter implements.
///
/// Adapters own their wire protocol, authentication and reconnection. Methods
/// take `&self` so one adapter can receive and send at the same time; keep
/// mutable state behind atomics or locks.
///
/// # Example Implementation
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use async_trait::async_trait;
/// use femtoclaw::bus::OutboundMessage;
/// use femtoclaw::channels::Channel;
/// use femtoclaw::error::Result;
///
/// struct Printer {
///     running: AtomicBool,
/// }
///
/// #[async_trait]
/// impl Channel for Printer {
///     fn name(&self) -> &str {
///         "printer"
///     }
///
///     async fn start(&self) -> Result<()> {
///         self.running.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<()> {
///         self.running.store(false, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn send(&self, msg: OutboundMessage) -> Result<()> {
///         println!("[{}] {}", msg.chat_id, msg.content);
///         Ok(())
///     }
///
///     fn is_running(&self) -> bool {
///         self.running.load(Ordering::SeqCst)
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name; outbound messages are routed by it.
    fn name(&self) -> &str;

    /// Connect and begin receiving.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to start (e.g., invalid token,
    /// network failure).
    async fn start(&self) -> Result<()>;

    /// Stop receiving and release resources.
    async fn stop(&self) -> Result<()>;

    /// Deliver one outbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails. The dispatcher logs it and does
    /// not retry.
    async fn send(&self, msg: OutboundMessage) -> Result<()>;

    /// Whether the channel is currently running.
    fn is_running(&self) -> bool;
}
