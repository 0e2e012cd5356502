//! Session types for femtoclaw
//!
//! A [`Session`] is the ordered record of turns for one conversation,
//! addressed by a [`SessionKey`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FemtoError;

/// Identifies one conversation: the `(channel, chat_id)` pair.
///
/// Renders as `channel:chat_id`. Parsing splits on the first `:`, so chat ids
/// may themselves contain colons.
///
/// ```
/// use femtoclaw::session::SessionKey;
///
/// let key: SessionKey = "matrix:!room:example.org".parse().unwrap();
/// assert_eq!(key.channel, "matrix");
/// assert_eq!(key.chat_id, "!room:example.org");
/// assert_eq!(key.to_string(), "matrix:!room:example.org");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SessionKey {
    pub channel: String,
    pub chat_id: String,
}

impl SessionKey {
    pub fn new(channel: &str, chat_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.chat_id)
    }
}

impl FromStr for SessionKey {
    type Err = FemtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((channel, chat_id)) if !channel.is_empty() => Ok(Self::new(channel, chat_id)),
            _ => Err(FemtoError::Session(format!(
                "invalid session key '{}', expected channel:chat_id",
                s
            ))),
        }
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for SessionKey {
    type Error = FemtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A conversation session: its turns plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Conversation this session belongs to
    pub key: SessionKey,
    /// Turns in the order they were appended
    pub messages: Vec<Message>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,
    /// Free-form session metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    /// Create a new empty session.
    ///
    /// ```
    /// use femtoclaw::session::{Session, SessionKey};
    ///
    /// let session = Session::new(SessionKey::new("telegram", "chat123"));
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.created_at, session.updated_at);
    /// ```
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// The most recent `max_turns` turns, oldest first.
    pub fn history(&self, max_turns: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max_turns);
        &self.messages[start..]
    }

    /// Get the number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A single message in a conversation.
///
/// Messages can be from users, assistants, system prompts, or tool results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// Tool calls made by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (for tool results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message answering `tool_call_id`.
    ///
    /// ```
    /// use femtoclaw::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "ok");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert!(msg.is_tool_result());
    /// ```
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call as it appears on the wire: arguments stay JSON-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_roundtrip() {
        let key = SessionKey::new("telegram", "chat123");
        assert_eq!(key.to_string(), "telegram:chat123");
        assert_eq!("telegram:chat123".parse::<SessionKey>().unwrap(), key);
    }

    #[test]
    fn test_session_key_rejects_malformed() {
        assert!("no-colon".parse::<SessionKey>().is_err());
        assert!(":missing-channel".parse::<SessionKey>().is_err());
    }

    #[test]
    fn test_session_key_serde_as_string() {
        let key = SessionKey::new("cli", "direct");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"cli:direct\"");
        let back: SessionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_history_is_bounded_suffix() {
        let mut session = Session::new(SessionKey::new("t", "c"));
        for i in 0..10 {
            session.messages.push(Message::user(&i.to_string()));
        }

        let tail = session.history(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].content, "7");
        assert_eq!(tail[2].content, "9");

        assert_eq!(session.history(50).len(), 10);
        assert!(session.history(0).is_empty());
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::system("s").role, Role::System);

        let msg = Message::assistant_with_tools("", vec![ToolCall::new("1", "echo", "{}")]);
        assert!(msg.has_tool_calls());
        assert!(!Message::assistant("done").has_tool_calls());
    }

    #[test]
    fn test_message_serialization_skips_empty_tool_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
