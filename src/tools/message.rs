//! Message tool for proactive outbound messages.
//!
//! Lets the model push text to the current conversation (or an explicit
//! `channel`/`chat_id`) in the middle of a turn, ahead of its final reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{MessageBus, OutboundMessage, SYSTEM_CHANNEL};
use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

/// Tool for sending outbound messages to channels.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    /// Create a new message tool.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

fn string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to a chat. Defaults to the conversation being handled; \
         pass channel and chat_id to reach a different one."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message text to send",
                    "minLength": 1
                },
                "channel": {
                    "type": "string",
                    "description": "Destination channel name. Omit to reply on the current channel."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Destination chat ID. Omit to reply in the current chat."
                },
                "reply_to": {
                    "type": "string",
                    "description": "Optional message ID to reply to."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let content = string_arg(&args, "content")
            .ok_or_else(|| FemtoError::Tool("Missing 'content' parameter".to_string()))?;

        let channel = string_arg(&args, "channel")
            .or_else(|| ctx.channel.clone())
            .ok_or_else(|| FemtoError::Tool("No target channel specified".to_string()))?;

        let chat_id = string_arg(&args, "chat_id")
            .or_else(|| ctx.chat_id.clone())
            .ok_or_else(|| FemtoError::Tool("No target chat_id specified".to_string()))?;

        if channel == SYSTEM_CHANNEL {
            return Err(FemtoError::Tool(
                "Cannot send to the internal system channel".to_string(),
            ));
        }

        let mut outbound = OutboundMessage::new(&channel, &chat_id, &content);
        if let Some(reply_to) = string_arg(&args, "reply_to") {
            outbound = outbound.with_reply(&reply_to);
        }

        self.bus.publish_outbound(outbound).await?;
        Ok(format!("Message sent to {}:{}", channel, chat_id))
    }
}
