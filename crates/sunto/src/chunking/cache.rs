//! Insert-only cache of chunk summaries keyed by message-id boundaries.
//!
//! A chunk, once committed, is never recomputed: [`ChunkCache::put`] refuses
//! to overwrite an existing id and surfaces the collision as
//! [`StoreError::DuplicateChunk`]. There are no update or delete operations.
//! Retention, if any, is the business of the [`ChunkStore`] implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::{ChunkSummary, chunk_id};
use crate::error::StoreError;

/// Backing storage for committed chunks.
///
/// Implementations must enforce uniqueness of `chunk_id` and return
/// results ordered by `start_message_id`.
pub trait ChunkStore: Send + Sync {
    /// Insert a new chunk. Must fail on a duplicate id rather than overwrite.
    fn insert(&self, chunk: ChunkSummary) -> Result<(), StoreError>;

    /// Every chunk of `chat_id` whose range intersects `[start, end]`.
    fn overlapping(
        &self,
        chat_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkSummary>, StoreError>;

    /// Every chunk of `chat_id`.
    fn all(&self, chat_id: i64) -> Result<Vec<ChunkSummary>, StoreError>;
}

/// In-process chunk store: one start-ordered map per chat.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    chats: Mutex<HashMap<i64, BTreeMap<(i64, i64), ChunkSummary>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a chunk id is already present.
    pub fn contains(&self, chat_id: i64, chunk_id: &str) -> Result<bool, StoreError> {
        let chats = self.chats.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .is_some_and(|chunks| chunks.values().any(|c| c.chunk_id == chunk_id)))
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn insert(&self, chunk: ChunkSummary) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().map_err(|_| StoreError::Poisoned)?;
        let chunks = chats.entry(chunk.chat_id).or_default();
        let key = (chunk.start_message_id, chunk.end_message_id);
        if chunks.contains_key(&key) {
            return Err(StoreError::DuplicateChunk(chunk.chunk_id));
        }
        chunks.insert(key, chunk);
        Ok(())
    }

    fn overlapping(
        &self,
        chat_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkSummary>, StoreError> {
        let chats = self.chats.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .map(|chunks| {
                chunks
                    .range(..=(end, i64::MAX))
                    .map(|(_, c)| c)
                    .filter(|c| c.overlaps(start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn all(&self, chat_id: i64) -> Result<Vec<ChunkSummary>, StoreError> {
        let chats = self.chats.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(chats
            .get(&chat_id)
            .map(|chunks| chunks.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Validating front for a [`ChunkStore`], with lookup diagnostics.
///
/// Cheap to clone; clones share the store and the counters.
#[derive(Clone)]
pub struct ChunkCache {
    store: Arc<dyn ChunkStore>,
    stats: Arc<CacheStats>,
}

#[derive(Debug, Default)]
struct CacheStats {
    /// Overlap lookups that found at least one chunk.
    hits: AtomicU64,
    /// Overlap lookups that found nothing.
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Commit a chunk summary.
    ///
    /// Rejects ids that don't match the boundary, inverted ranges, empty
    /// chunks, and duplicates.
    pub fn put(
        &self,
        id: &str,
        chat_id: i64,
        start: i64,
        end: i64,
        count: usize,
        summary: impl Into<String>,
    ) -> Result<ChunkSummary, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidChunk {
            chunk_id: id.to_string(),
            reason: reason.to_string(),
        };
        if start > end {
            return Err(invalid("start_message_id exceeds end_message_id"));
        }
        if count == 0 {
            return Err(invalid("chunk folds no messages"));
        }
        if id != chunk_id(chat_id, start, end) {
            return Err(invalid("id does not match its boundary"));
        }

        let chunk = ChunkSummary {
            chunk_id: id.to_string(),
            chat_id,
            start_message_id: start,
            end_message_id: end,
            message_count: count,
            summary_text: summary.into(),
            created_at: Utc::now(),
        };
        self.store.insert(chunk.clone())?;
        Ok(chunk)
    }

    /// Chunks intersecting `[start, end]`, ordered by `start_message_id`.
    pub fn get_overlapping(
        &self,
        chat_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkSummary>, StoreError> {
        let chunks = self.store.overlapping(chat_id, start, end)?;
        if chunks.is_empty() {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(chunks)
    }

    /// Every chunk of the chat, ordered by `start_message_id`.
    pub fn get_all(&self, chat_id: i64) -> Result<Vec<ChunkSummary>, StoreError> {
        self.store.all(chat_id)
    }

    /// Overlap lookup hit count.
    pub fn hits(&self) -> u64 {
        self.stats.hits.load(Ordering::Relaxed)
    }

    /// Overlap lookup miss count.
    pub fn misses(&self) -> u64 {
        self.stats.misses.load(Ordering::Relaxed)
    }

    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = (self.hits(), self.misses());
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ChunkCache {
        ChunkCache::new(Arc::new(InMemoryChunkStore::new()))
    }

    fn put(cache: &ChunkCache, chat: i64, start: i64, end: i64) -> Result<ChunkSummary, StoreError> {
        cache.put(
            &chunk_id(chat, start, end),
            chat,
            start,
            end,
            (end - start + 1) as usize,
            format!("summary {start}-{end}"),
        )
    }

    #[test]
    fn put_and_get_overlapping() {
        let cache = cache();
        put(&cache, 1, 71, 140).unwrap();
        put(&cache, 1, 1, 70).unwrap();
        put(&cache, 2, 1, 70).unwrap();

        let got = cache.get_overlapping(1, 50, 80).unwrap();
        let starts: Vec<i64> = got.iter().map(|c| c.start_message_id).collect();
        assert_eq!(starts, vec![1, 71]);

        let got = cache.get_overlapping(1, 141, 200).unwrap();
        assert!(got.is_empty());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 0.5).abs() < 0.01);
    }

    #[test]
    fn duplicate_put_is_rejected() {
        let cache = cache();
        put(&cache, 1, 1, 70).unwrap();
        let err = put(&cache, 1, 1, 70).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateChunk(id) if id == "1_1_70"));
        assert_eq!(cache.get_all(1).unwrap().len(), 1);
    }

    #[test]
    fn invalid_chunks_are_rejected() {
        let cache = cache();
        assert!(matches!(
            cache.put("1_9_3", 1, 9, 3, 1, "x"),
            Err(StoreError::InvalidChunk { .. })
        ));
        assert!(matches!(
            cache.put("1_1_3", 1, 1, 3, 0, "x"),
            Err(StoreError::InvalidChunk { .. })
        ));
        assert!(matches!(
            cache.put("wrong", 1, 1, 3, 3, "x"),
            Err(StoreError::InvalidChunk { .. })
        ));
        assert!(cache.get_all(1).unwrap().is_empty());
    }

    #[test]
    fn get_all_is_ordered_by_start() {
        let cache = cache();
        put(&cache, 1, 21, 30).unwrap();
        put(&cache, 1, 1, 10).unwrap();
        put(&cache, 1, 11, 20).unwrap();
        let starts: Vec<i64> = cache
            .get_all(1)
            .unwrap()
            .iter()
            .map(|c| c.start_message_id)
            .collect();
        assert_eq!(starts, vec![1, 11, 21]);
    }

    #[test]
    fn clones_share_state() {
        let a = cache();
        let b = a.clone();
        put(&a, 3, 1, 5).unwrap();
        assert_eq!(b.get_all(3).unwrap().len(), 1);
    }
}
