//! Tools module - Tool definitions and execution for LLM function calling
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (channel, chat_id, workspace)
//! - `ToolRegistry`: Name-keyed registry that validates arguments and turns
//!   every failure into an error `ToolResult`
//!
//! # Built-in Tools
//!
//! - `EchoTool`: Simple echo tool for testing
//! - `MessageTool`: Push a message to a conversation mid-turn
//! - `CronTool`: Add, list and remove scheduled jobs
//!
//! # Example
//!
//! ```rust
//! use femtoclaw::tools::{EchoTool, ToolCallRequest, ToolContext, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(EchoTool).unwrap();
//!
//! let call = ToolCallRequest::new("call_1", "echo", json!({"message": "Hello!"}));
//! let result = registry.execute(&call, &ToolContext::new()).await;
//! assert_eq!(result.output, "Hello!");
//!
//! let definitions = registry.definitions();
//! assert_eq!(definitions.len(), 1);
//! # });
//! ```

pub mod cron;
pub mod message;
mod registry;
mod schema;
mod types;

pub use registry::ToolRegistry;
pub use schema::validate_arguments;
pub use types::{Tool, ToolCallRequest, ToolContext, ToolResult};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A simple echo tool for testing purposes.
///
/// ```rust
/// use femtoclaw::tools::{Tool, ToolContext, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let result = EchoTool.execute(json!({"message": "Hello"}), &ToolContext::new()).await;
/// assert_eq!(result.unwrap(), "Hello");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(message.to_string())
    }
}
