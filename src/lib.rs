//! femtoclaw - personal AI agent runtime
//!
//! Inbound messages from any channel flow over the [`MessageBus`] to the
//! [`AgentLoop`](agent::AgentLoop), which assembles context, calls the model,
//! runs tools, records the turn in the session store and publishes one reply.
//! The [`CronService`](cron::CronService) injects scheduled messages onto the
//! same bus.

pub mod agent;
pub mod bus;
pub mod channels;
pub mod config;
pub mod cron;
pub mod error;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, ContextAssembler};
pub use bus::{InboundMessage, MediaAttachment, MediaType, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{FemtoError, Result};
pub use providers::{
    ChatOptions, LLMProvider, LLMResponse, LLMToolCall, OpenAIProvider, ToolDefinition, Usage,
};
pub use session::{Message, Role, Session, SessionKey, SessionManager, SessionStore, ToolCall};
pub use tools::{Tool, ToolRegistry};
