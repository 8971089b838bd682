//! Chat message model and its rendering into completion input.
//!
//! Messages are owned by the [`MessageLog`](log::MessageLog) collaborator;
//! the pipeline only reads them. Only `chat_id`, `message_id`, `timestamp`,
//! and the renderable content matter to summarization.

pub mod log;
pub mod time_range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for message timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renderable body of a message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    /// A photo, already described by the image pipeline.
    Image {
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

/// One message in a chat. Immutable once created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub chat_id: i64,
    /// Monotonically increasing within a chat.
    pub message_id: i64,
    pub author: String,
    pub content: MessageContent,
    /// Original author or channel when the message was forwarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_from: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn text(
        chat_id: i64,
        message_id: i64,
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            author: author.into(),
            content: MessageContent::Text { text: text.into() },
            forwarded_from: None,
            timestamp,
        }
    }

    pub fn image(
        chat_id: i64,
        message_id: i64,
        author: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            author: author.into(),
            content: MessageContent::Image {
                description: description.into(),
                caption: None,
            },
            forwarded_from: None,
            timestamp,
        }
    }

    pub fn forwarded_from(mut self, origin: impl Into<String>) -> Self {
        self.forwarded_from = Some(origin.into());
        self
    }

    /// One-line rendering used as completion input.
    ///
    /// The `#id` prefix lets the model cite messages with integer link
    /// targets, which the sanitizer turns into deep links.
    pub fn render(&self) -> String {
        let body = match &self.content {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Image {
                description,
                caption: Some(caption),
            } => format!("{caption} [sent an image: {description}]"),
            MessageContent::Image { description, .. } => {
                format!("[sent an image: {description}]")
            }
        };
        let forwarded = self
            .forwarded_from
            .as_deref()
            .map(|origin| format!(" (forwarded from {origin})"))
            .unwrap_or_default();
        format!(
            "[#{} {}] {}: {body}{forwarded}",
            self.message_id,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.author
        )
    }
}

/// Render a message sequence, one message per line.
pub fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(ChatMessage::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn render_text_message() {
        let msg = ChatMessage::text(-100, 42, "alice", "hello all", ts());
        assert_eq!(msg.render(), "[#42 2024-05-01 09:30:00] alice: hello all");
    }

    #[test]
    fn render_image_with_caption_and_forward() {
        let mut msg = ChatMessage::image(-100, 7, "bob", "a cat on a keyboard", ts())
            .forwarded_from("cats channel");
        if let MessageContent::Image { caption, .. } = &mut msg.content {
            *caption = Some("look".into());
        }
        assert_eq!(
            msg.render(),
            "[#7 2024-05-01 09:30:00] bob: look [sent an image: a cat on a keyboard] (forwarded from cats channel)"
        );
    }

    #[test]
    fn serde_uses_tagged_content() {
        let msg = ChatMessage::text(1, 2, "carol", "hi", ts());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"]["kind"], "text");
        assert!(json.get("forwarded_from").is_none());
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn render_messages_joins_lines() {
        let msgs = vec![
            ChatMessage::text(1, 1, "a", "one", ts()),
            ChatMessage::text(1, 2, "b", "two", ts()),
        ];
        assert_eq!(render_messages(&msgs).lines().count(), 2);
        assert_eq!(render_messages(&[]), "");
    }
}
