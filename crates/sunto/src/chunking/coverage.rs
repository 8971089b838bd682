//! Which messages are still waiting for a chunk.
//!
//! A message is *covered* iff some stored chunk's range contains its id.
//! Chunk ranges are folded into an [`IntervalSet`] (sorted, merged,
//! disjoint) so each membership test is a binary search instead of a scan
//! over every chunk.

use std::sync::Arc;

use super::cache::ChunkCache;
use super::ChunkSummary;
use crate::chat::ChatMessage;
use crate::chat::log::MessageLog;
use crate::error::StoreError;

/// Sorted, disjoint, inclusive `[start, end]` intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    ranges: Vec<(i64, i64)>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary (possibly overlapping, unsorted) ranges.
    /// Inverted ranges are ignored.
    pub fn from_ranges(ranges: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut sorted: Vec<(i64, i64)> = ranges.into_iter().filter(|(s, e)| s <= e).collect();
        sorted.sort_unstable();

        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(sorted.len());
        for (start, end) in sorted {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    pub fn from_chunks(chunks: &[ChunkSummary]) -> Self {
        Self::from_ranges(chunks.iter().map(|c| (c.start_message_id, c.end_message_id)))
    }

    /// O(log n) membership test.
    pub fn contains(&self, id: i64) -> bool {
        let idx = self.ranges.partition_point(|&(start, _)| start <= id);
        idx > 0 && self.ranges[idx - 1].1 >= id
    }

    /// The merged intervals, ascending.
    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }
}

/// Computes the uncovered message subsequence of a chat.
#[derive(Clone)]
pub struct CoverageTracker {
    log: Arc<dyn MessageLog>,
    cache: ChunkCache,
    history_cap: usize,
}

impl CoverageTracker {
    pub fn new(log: Arc<dyn MessageLog>, cache: ChunkCache, history_cap: usize) -> Self {
        Self {
            log,
            cache,
            history_cap,
        }
    }

    /// Messages (latest `history_cap` of the chat) not covered by any chunk,
    /// ascending by `message_id`.
    pub fn uncovered(&self, chat_id: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.log.recent(chat_id, self.history_cap)?;
        let chunks = self.cache.get_all(chat_id)?;
        let covered = IntervalSet::from_chunks(&chunks);

        let mut uncovered: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| !covered.contains(m.message_id))
            .collect();
        uncovered.sort_by_key(|m| m.message_id);
        Ok(uncovered)
    }

    /// [`uncovered`](Self::uncovered) restricted to `[start, end]`.
    pub fn uncovered_in(
        &self,
        chat_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut tail = self.uncovered(chat_id)?;
        tail.retain(|m| start <= m.message_id && m.message_id <= end);
        Ok(tail)
    }
}
