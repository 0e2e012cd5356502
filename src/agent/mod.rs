//! Agent module - turn engine and context assembly
//!
//! The agent is responsible for:
//!
//! - Consuming inbound messages from the bus, one turn at a time
//! - Assembling the system prompt and recent history for each turn
//! - Calling the model provider and running any requested tools
//! - Recording the turn in the session store and publishing the reply
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │
//!        │ outbound          ├──────────────────┬────────────────┐
//!        └───────────────────┤                  ▼                ▼
//!                            ▼           ┌─────────────┐  ┌─────────────┐
//!                     ┌─────────────┐    │   Context   │  │    Tool     │
//!                     │   Session   │    │  Assembler  │  │  Registry   │
//!                     │    Store    │    └─────────────┘  └─────────────┘
//!                     └─────────────┘
//! ```

mod context;
mod r#loop;

pub use context::{
    AssembledContext, BootstrapDocsProvider, ContextAssembler, ContextProvider, IdentityProvider,
    MemoryProvider, SkillsProvider, BOOTSTRAP_FILES, MEMORY_FILE,
};
pub use r#loop::{AgentLoop, DIRECT_SESSION_KEY, EMPTY_RESPONSE_FALLBACK};
