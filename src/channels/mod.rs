//! Channels module - transport adapters
//!
//! Adapters connect chat surfaces to the [`MessageBus`](crate::bus::MessageBus):
//! they publish what users send as inbound messages and receive the agent's
//! replies through outbound subscriptions set up by the [`ChannelManager`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ChannelManager                │
//! │                                              │
//! │   ┌─────────┐  ┌─────────┐  ┌─────────┐      │
//! │   │ Console │  │ Adapter │  │ Adapter │ ...  │
//! │   └────┬────┘  └────┬────┘  └────┬────┘      │
//! │        └────────────┼────────────┘           │
//! │               ┌─────┴─────┐                  │
//! │               │MessageBus │                  │
//! │               │ (inbound/ │                  │
//! │               │ outbound) │                  │
//! │               └───────────┘                  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use femtoclaw::bus::MessageBus;
//! use femtoclaw::channels::{ChannelManager, ConsoleChannel};
//!
//! # tokio_test::block_on(async {
//! let bus = Arc::new(MessageBus::new());
//! let manager = ChannelManager::new(bus.clone());
//! manager
//!     .register(Arc::new(ConsoleChannel::new(bus, "console")))
//!     .await
//!     .unwrap();
//! assert!(manager.has_channel("cli").await);
//! # })
//! ```

pub mod console;
mod manager;
mod types;

pub use console::{ConsoleChannel, CONSOLE_CHANNEL};
pub use manager::ChannelManager;
pub use types::Channel;
