//! Message types carried by the femtoclaw message bus
//!
//! Inbound messages flow from transport adapters (and the scheduler) to the
//! agent; outbound messages flow from the agent back to adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::SessionKey;

/// Channel name used for internally generated messages that must be routed
/// back to another conversation.
pub const SYSTEM_CHANNEL: &str = "system";

/// A message received from a chat surface or produced by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "telegram", "cli")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Attachments, in the order the adapter received them
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    /// Free-form adapter metadata. `model` overrides the model for this turn.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the adapter accepted the message
    pub received_at: DateTime<Utc>,
}

/// A message to be delivered through a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Attachments to send alongside the text
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    /// Optional message ID to reply to
    pub reply_to: Option<String>,
}

/// A media attachment reference (image, audio, video, or document).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAttachment {
    /// The type of media
    pub media_type: MediaType,
    /// URL or local path of the media
    pub url: Option<String>,
    /// Original filename
    pub filename: Option<String>,
}

/// Types of media that can be attached to messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
    Document,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Document => "document",
        };
        f.write_str(s)
    }
}

impl InboundMessage {
    /// Creates a new inbound message stamped with the current time.
    ///
    /// # Example
    /// ```
    /// use femtoclaw::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.session_key().to_string(), "telegram:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            metadata: HashMap::new(),
            received_at: Utc::now(),
        }
    }

    /// Appends an attachment (builder pattern).
    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media.push(media);
        self
    }

    /// Adds a metadata key-value pair (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Checks if this message has any media attached.
    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }

    /// The conversation this message belongs to.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.channel, &self.chat_id)
    }

    /// Whether this is an internal message addressed to another conversation.
    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }
}

impl OutboundMessage {
    /// Creates a new outbound message.
    ///
    /// # Example
    /// ```
    /// use femtoclaw::bus::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            reply_to: None,
        }
    }

    /// Sets the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Appends an attachment (builder pattern).
    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media.push(media);
        self
    }

    /// Creates an outbound message addressed to the conversation `key`.
    pub fn to_session(key: &SessionKey, content: &str) -> Self {
        Self::new(&key.channel, &key.chat_id, content)
    }
}

impl MediaAttachment {
    /// Creates a new media attachment of the specified type.
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            url: None,
            filename: None,
        }
    }

    /// Sets the URL for the media (builder pattern).
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Sets the filename (builder pattern).
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    /// One-line description used when the attachment is shown to the model,
    /// e.g. `[image: photo.png]`.
    pub fn describe(&self) -> String {
        let label = self
            .filename
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("unnamed");
        format!("[{}: {}]", self.media_type, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.sender_id, "user123");
        assert_eq!(msg.chat_id, "chat456");
        assert_eq!(msg.session_key(), SessionKey::new("telegram", "chat456"));
        assert!(!msg.has_media());
        assert!(!msg.is_system());
        assert!(msg.received_at <= Utc::now());
    }

    #[test]
    fn test_inbound_media_keeps_order() {
        let msg = InboundMessage::new("discord", "u1", "c1", "look")
            .with_media(MediaAttachment::new(MediaType::Image).with_filename("a.png"))
            .with_media(MediaAttachment::new(MediaType::Audio).with_url("https://x/b.ogg"));

        assert_eq!(msg.media.len(), 2);
        assert_eq!(msg.media[0].describe(), "[image: a.png]");
        assert_eq!(msg.media[1].describe(), "[audio: https://x/b.ogg]");
    }

    #[test]
    fn test_inbound_with_metadata() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
            .with_metadata("model", "small-model");
        assert_eq!(msg.metadata.get("model").map(String::as_str), Some("small-model"));
    }

    #[test]
    fn test_system_message_detection() {
        let msg = InboundMessage::new(SYSTEM_CHANNEL, "subagent", "telegram:42", "done");
        assert!(msg.is_system());
    }

    #[test]
    fn test_outbound_to_session() {
        let key = SessionKey::new("slack", "C01");
        let msg = OutboundMessage::to_session(&key, "hi").with_reply("m1");
        assert_eq!(msg.channel, "slack");
        assert_eq!(msg.chat_id, "C01");
        assert_eq!(msg.reply_to.as_deref(), Some("m1"));
        assert!(msg.media.is_empty());
    }

    #[test]
    fn test_inbound_deserialize_without_optional_fields() {
        let json = r#"{
            "channel": "cli",
            "sender_id": "me",
            "chat_id": "direct",
            "content": "hey",
            "received_at": "2026-01-01T00:00:00Z"
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert!(msg.media.is_empty());
        assert!(msg.metadata.is_empty());
    }
}
