use std::fmt;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Who wrote a chat turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Assistant => write!(f, "assistant"),
        }
    }
}

/// Delivery status of a user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
        }
    }
}

// =============================================================================
// Structured content
// =============================================================================

/// One typed block of formatted response content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Block {
    Heading(String),
    Subheading(String),
    Paragraph(String),
}

impl Block {
    /// The block's text, independent of its kind.
    pub fn text(&self) -> &str {
        match self {
            Block::Heading(t) | Block::Subheading(t) | Block::Paragraph(t) => t,
        }
    }
}

/// Ordered sequence of typed blocks produced by the response formatter.
///
/// Carries no rendering technology; renderers decide how each block looks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredContent {
    blocks: Vec<Block>,
}

impl StructuredContent {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Flatten to plain text, one block per line.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Message
// =============================================================================

/// Unique, strictly increasing identifier of a message within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Seed an id from the current time in milliseconds.
    pub fn now() -> Self {
        MessageId(Utc::now().timestamp_millis().max(0) as u64)
    }

    /// The following id, or `None` when the id space is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(MessageId)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message text: either raw or already structured, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    Plain(String),
    Formatted(StructuredContent),
}

impl MessageBody {
    pub fn is_formatted(&self) -> bool {
        matches!(self, MessageBody::Formatted(_))
    }

    /// Text suitable for speech or plain renderers.
    pub fn plain_text(&self) -> String {
        match self {
            MessageBody::Plain(text) => text.clone(),
            MessageBody::Formatted(content) => content.plain_text(),
        }
    }
}

/// One chat turn.
///
/// Fields are private; a message never changes after construction. The only
/// exception is the id, which a store may re-seed before the message is
/// inserted so that ordering stays strictly increasing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    body: MessageBody,
    author: Author,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<MessageStatus>,
    #[serde(default)]
    is_error: bool,
}

impl Message {
    /// A user message, marked as sent.
    pub fn user(text: impl Into<String>) -> Self {
        Self::build(
            MessageBody::Plain(text.into()),
            Author::User,
            Some(MessageStatus::Sent),
            false,
        )
    }

    /// An assistant reply.
    pub fn assistant(body: MessageBody) -> Self {
        Self::build(body, Author::Assistant, None, false)
    }

    /// A synthesized assistant failure message.
    pub fn assistant_error(text: impl Into<String>) -> Self {
        Self::build(MessageBody::Plain(text.into()), Author::Assistant, None, true)
    }

    fn build(
        body: MessageBody,
        author: Author,
        status: Option<MessageStatus>,
        is_error: bool,
    ) -> Self {
        Self {
            id: MessageId::now(),
            body,
            author,
            timestamp: display_time(),
            status,
            is_error,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn status(&self) -> Option<MessageStatus> {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn is_formatted(&self) -> bool {
        self.body.is_formatted()
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    pub fn plain_text(&self) -> String {
        self.body.plain_text()
    }

    /// Return the message with a different id. Used by stores before insertion.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }
}

/// Local wall-clock time as shown next to each message.
fn display_time() -> String {
    Local::now().format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_has_sent_status() {
        let msg = Message::user("Tell me about Lisbon");
        assert_eq!(msg.author(), Author::User);
        assert_eq!(msg.status(), Some(MessageStatus::Sent));
        assert!(!msg.is_error());
        assert!(!msg.is_formatted());
        assert_eq!(msg.plain_text(), "Tell me about Lisbon");
    }

    #[test]
    fn test_assistant_message_has_no_status() {
        let msg = Message::assistant(MessageBody::Plain("Hello!".into()));
        assert_eq!(msg.author(), Author::Assistant);
        assert!(msg.status().is_none());
        assert!(!msg.is_error());
    }

    #[test]
    fn test_assistant_error_flag() {
        let msg = Message::assistant_error("Sorry");
        assert!(msg.is_error());
        assert!(!msg.is_user());
    }

    #[test]
    fn test_timestamp_is_hours_and_minutes() {
        let msg = Message::user("x");
        let ts = msg.timestamp();
        assert_eq!(ts.len(), 5);
        assert_eq!(&ts[2..3], ":");
    }

    #[test]
    fn test_formatted_body_plain_text() {
        let content = StructuredContent::new(vec![
            Block::Heading("Kyoto".into()),
            Block::Subheading("History".into()),
            Block::Paragraph("Imperial capital for a millennium.".into()),
        ]);
        let msg = Message::assistant(MessageBody::Formatted(content));
        assert!(msg.is_formatted());
        assert_eq!(
            msg.plain_text(),
            "Kyoto\nHistory\nImperial capital for a millennium."
        );
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::user("hi").with_id(MessageId(42));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["author"], "user");
        assert_eq!(value["status"], "sent");
        assert_eq!(value["body"]["format"], "plain");
        assert_eq!(value["body"]["text"], "hi");
        assert_eq!(value["is_error"], false);
    }

    #[test]
    fn test_assistant_json_omits_status() {
        let msg = Message::assistant(MessageBody::Formatted(StructuredContent::new(vec![
            Block::Heading("Rome".into()),
        ])));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("status").is_none());
        assert_eq!(value["body"]["format"], "formatted");
        assert_eq!(value["body"]["text"][0]["kind"], "heading");
        assert_eq!(value["body"]["text"][0]["text"], "Rome");
    }

    #[test]
    fn test_message_id_next_saturates() {
        assert_eq!(MessageId(7).next(), Some(MessageId(8)));
        assert_eq!(MessageId(u64::MAX).next(), None);
    }

    #[test]
    fn test_author_display() {
        assert_eq!(Author::User.to_string(), "user");
        assert_eq!(Author::Assistant.to_string(), "assistant");
        assert_eq!(MessageStatus::Sent.to_string(), "sent");
    }
}
