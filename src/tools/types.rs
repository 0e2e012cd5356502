//! Tool types for femtoclaw
//!
//! Defines the [`Tool`] trait every executor implements, the per-call
//! [`ToolContext`], and the request/result pair exchanged with the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use femtoclaw::tools::{Tool, ToolContext};
/// use femtoclaw::error::Result;
///
/// struct Clock;
///
/// #[async_trait]
/// impl Tool for Clock {
///     fn name(&self) -> &str { "clock" }
///     fn description(&self) -> &str { "Returns the current UTC time" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({ "type": "object", "properties": {} })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
///         Ok(chrono::Utc::now().to_rfc3339())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// Description advertised to the model.
    fn description(&self) -> &str;

    /// JSON schema for the arguments. Checked by the registry before
    /// [`Tool::execute`] runs.
    fn parameters(&self) -> Value;

    /// Run the tool. Any `Err` is reported back to the model as an error
    /// result; it never aborts the turn.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The channel name (e.g., "telegram", "discord", "cli")
    pub channel: Option<String>,
    /// The chat/conversation ID within the channel
    pub chat_id: Option<String>,
    /// The workspace directory for file operations
    pub workspace: Option<String>,
}

impl ToolContext {
    /// Create a new empty tool context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel and chat ID.
    ///
    /// ```
    /// use femtoclaw::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_channel("telegram", "123456");
    /// assert_eq!(ctx.channel.as_deref(), Some("telegram"));
    /// assert_eq!(ctx.chat_id.as_deref(), Some("123456"));
    /// ```
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    /// Set the workspace directory.
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}

/// A tool invocation requested by the model, arguments already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(call_id: &str, name: &str, arguments: Value) -> Self {
        Self {
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// Outcome of one tool call, always tied to the request's `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result for `call`.
    pub fn success(call: &ToolCallRequest, output: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Error result for `call`; the model sees `message` as the output.
    pub fn error(call: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            output: message.into(),
            is_error: true,
        }
    }

    /// Text handed back to the model.
    pub fn for_model(&self) -> String {
        if self.is_error {
            format!("Error: {}", self.output)
        } else {
            self.output.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_context_builders() {
        let ctx = ToolContext::new()
            .with_channel("telegram", "42")
            .with_workspace("/srv/ws");
        assert_eq!(ctx.channel.as_deref(), Some("telegram"));
        assert_eq!(ctx.chat_id.as_deref(), Some("42"));
        assert_eq!(ctx.workspace.as_deref(), Some("/srv/ws"));
        assert!(ToolContext::default().channel.is_none());
    }

    #[test]
    fn test_result_keeps_call_identity() {
        let call = ToolCallRequest::new("call_7", "echo", json!({"message": "x"}));
        let ok = ToolResult::success(&call, "x");
        let err = ToolResult::error(&call, "boom");

        assert_eq!(ok.call_id, "call_7");
        assert_eq!(err.call_id, "call_7");
        assert_eq!(err.name, "echo");
        assert!(!ok.is_error);
        assert!(err.is_error);
        assert_eq!(ok.for_model(), "x");
        assert_eq!(err.for_model(), "Error: boom");
    }
}
