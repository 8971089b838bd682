//! The message log collaborator: append plus point and range queries.
//!
//! Ingestion and durable storage belong to whoever implements
//! [`MessageLog`]. [`InMemoryMessageLog`] is the reference implementation
//! and the index behind [`JsonlMessageLog`](crate::store::jsonl::JsonlMessageLog).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::ChatMessage;
use crate::error::StoreError;

/// Ordered, append-only message storage for many chats.
///
/// All range results are sorted ascending by `message_id`.
pub trait MessageLog: Send + Sync {
    /// Append a message. Rejects a `message_id` already present in the chat.
    fn append(&self, message: ChatMessage) -> Result<(), StoreError>;

    /// Messages with `from_id <= message_id <= to_id`.
    fn range_by_id(
        &self,
        chat_id: i64,
        from_id: i64,
        to_id: i64,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// Messages with `from <= timestamp <= to`.
    fn range_by_time(
        &self,
        chat_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// The latest `cap` messages of the chat, ascending.
    fn recent(&self, chat_id: i64, cap: usize) -> Result<Vec<ChatMessage>, StoreError>;

    /// The most recent message written by `author`, if any.
    fn last_by_author(&self, chat_id: i64, author: &str)
    -> Result<Option<ChatMessage>, StoreError>;
}

/// In-process message log backed by one ordered map per chat.
#[derive(Debug, Default)]
pub struct InMemoryMessageLog {
    chats: RwLock<HashMap<i64, BTreeMap<i64, ChatMessage>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from existing messages, rejecting duplicates.
    pub fn with_messages(
        messages: impl IntoIterator<Item = ChatMessage>,
    ) -> Result<Self, StoreError> {
        let log = Self::new();
        for message in messages {
            log.append(message)?;
        }
        Ok(log)
    }

    /// Whether the chat already holds this message id.
    pub fn contains(&self, chat_id: i64, message_id: i64) -> Result<bool, StoreError> {
        let chats = self.chats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .is_some_and(|msgs| msgs.contains_key(&message_id)))
    }

    /// Number of messages stored for a chat.
    pub fn len(&self, chat_id: i64) -> usize {
        self.chats
            .read()
            .map(|chats| chats.get(&chat_id).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Ids of every chat with at least one message.
    pub fn chat_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .chats
            .read()
            .map(|chats| chats.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

impl MessageLog for InMemoryMessageLog {
    fn append(&self, message: ChatMessage) -> Result<(), StoreError> {
        let mut chats = self.chats.write().map_err(|_| StoreError::Poisoned)?;
        let chat = chats.entry(message.chat_id).or_default();
        if chat.contains_key(&message.message_id) {
            return Err(StoreError::DuplicateMessage {
                chat_id: message.chat_id,
                message_id: message.message_id,
            });
        }
        chat.insert(message.message_id, message);
        Ok(())
    }

    fn range_by_id(
        &self,
        chat_id: i64,
        from_id: i64,
        to_id: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if from_id > to_id {
            return Ok(Vec::new());
        }
        let chats = self.chats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .map(|msgs| msgs.range(from_id..=to_id).map(|(_, m)| m.clone()).collect())
            .unwrap_or_default())
    }

    fn range_by_time(
        &self,
        chat_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let chats = self.chats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .map(|msgs| {
                msgs.values()
                    .filter(|m| m.timestamp >= from && m.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn recent(&self, chat_id: i64, cap: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let chats = self.chats.read().map_err(|_| StoreError::Poisoned)?;
        let Some(msgs) = chats.get(&chat_id) else {
            return Ok(Vec::new());
        };
        let mut latest: Vec<ChatMessage> = msgs.values().rev().take(cap).cloned().collect();
        latest.reverse();
        Ok(latest)
    }

    fn last_by_author(
        &self,
        chat_id: i64,
        author: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let chats = self.chats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .and_then(|msgs| msgs.values().rev().find(|m| m.author == author).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn msg(id: i64, author: &str) -> ChatMessage {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ChatMessage::text(5, id, author, format!("m{id}"), base + Duration::minutes(id))
    }

    #[test]
    fn append_rejects_duplicates() {
        let log = InMemoryMessageLog::new();
        log.append(msg(1, "a")).unwrap();
        let err = log.append(msg(1, "a")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateMessage {
                chat_id: 5,
                message_id: 1
            }
        ));
    }

    #[test]
    fn range_by_id_is_inclusive_and_sorted() {
        let log = InMemoryMessageLog::with_messages([msg(3, "a"), msg(1, "a"), msg(2, "b")]).unwrap();
        let ids: Vec<i64> = log
            .range_by_id(5, 1, 2)
            .unwrap()
            .iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(log.range_by_id(5, 3, 1).unwrap().is_empty());
        assert!(log.range_by_id(99, 1, 3).unwrap().is_empty());
    }

    #[test]
    fn recent_returns_latest_ascending() {
        let log = InMemoryMessageLog::with_messages((1..=10).map(|i| msg(i, "a"))).unwrap();
        let ids: Vec<i64> = log
            .recent(5, 3)
            .unwrap()
            .iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec![8, 9, 10]);
    }

    #[test]
    fn range_by_time_filters() {
        let log = InMemoryMessageLog::with_messages((1..=10).map(|i| msg(i, "a"))).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let got = log
            .range_by_time(5, base + Duration::minutes(4), base + Duration::minutes(6))
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].message_id, 4);
    }

    #[test]
    fn last_by_author_finds_latest() {
        let log =
            InMemoryMessageLog::with_messages([msg(1, "a"), msg(2, "b"), msg(3, "a")]).unwrap();
        assert_eq!(log.last_by_author(5, "a").unwrap().unwrap().message_id, 3);
        assert!(log.last_by_author(5, "zed").unwrap().is_none());
        assert_eq!(log.len(5), 3);
        assert_eq!(log.chat_ids(), vec![5]);
    }
}
