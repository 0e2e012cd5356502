//! Tool registry for femtoclaw
//!
//! This module provides the `ToolRegistry` struct for managing and executing tools.
//! Every execution goes through argument validation and is converted into a
//! [`ToolResult`]; nothing a tool does can abort the surrounding turn.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{FemtoError, Result};
use crate::providers::ToolDefinition;

use super::schema::validate_arguments;
use super::{Tool, ToolCallRequest, ToolContext, ToolResult};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use femtoclaw::tools::{EchoTool, ToolCallRequest, ToolContext, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(EchoTool).unwrap();
///
/// let call = ToolCallRequest::new("call_1", "echo", json!({"message": "hello"}));
/// let result = registry.execute(&call, &ToolContext::new()).await;
/// assert!(!result.is_error);
/// assert_eq!(result.output, "hello");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names are unique; registering a second tool under an
    /// existing name is rejected.
    ///
    /// ```
    /// use femtoclaw::tools::{ToolRegistry, EchoTool};
    ///
    /// let mut registry = ToolRegistry::new();
    /// registry.register(EchoTool).unwrap();
    /// assert!(registry.register(EchoTool).is_err());
    /// ```
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(FemtoError::Tool(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Validate and run one tool call.
    ///
    /// Unknown tools, schema violations, executor errors and executor panics
    /// all come back as a [`ToolResult`] with `is_error` set, carrying the
    /// request's `call_id`.
    pub async fn execute(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.call_id, "Tool not found");
            return ToolResult::error(call, format!("Tool not found: {}", call.name));
        };

        let args = match &call.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        if let Err(errors) = validate_arguments(&tool.parameters(), &args) {
            warn!(
                tool = %call.name,
                call_id = %call.call_id,
                violations = errors.len(),
                "Tool arguments failed validation"
            );
            return ToolResult::error(
                call,
                format!("Invalid arguments for '{}': {}", call.name, errors.join("; ")),
            );
        }

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                info!(tool = %call.name, duration_ms, "Tool executed successfully");
                ToolResult::success(call, output)
            }
            Ok(Err(e)) => {
                error!(tool = %call.name, error = %e, duration_ms, "Tool execution failed");
                ToolResult::error(call, e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(tool = %call.name, panic = %reason, duration_ms, "Tool panicked");
                ToolResult::error(call, format!("Tool '{}' panicked: {}", call.name, reason))
            }
        }
    }

    /// Tool definitions for advertising to the model, sorted by name.
    ///
    /// ```
    /// use femtoclaw::tools::{ToolRegistry, EchoTool};
    ///
    /// let mut registry = ToolRegistry::new();
    /// registry.register(EchoTool).unwrap();
    ///
    /// let definitions = registry.definitions();
    /// assert_eq!(definitions.len(), 1);
    /// assert_eq!(definitions[0].name, "echo");
    /// ```
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get the names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
