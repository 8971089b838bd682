//! Chunk caching: boundaries, storage, coverage, and backfill.
//!
//! The four stages build on each other, leaves first:
//!
//! 1. **[`boundary`]** slices an ordered message sequence into fixed-size,
//!    non-overlapping ranges. A trailing partial slice is never committable.
//!
//! 2. **[`cache`]** [`ChunkCache`](cache::ChunkCache), an insert-only store
//!    of per-range summaries with overlap lookup.
//!
//! 3. **[`coverage`]** computes which messages no stored chunk covers,
//!    using a sorted [`IntervalSet`](coverage::IntervalSet).
//!
//! 4. **[`backfill`]** [`BackfillProcessor`](backfill::BackfillProcessor)
//!    turns the uncovered backlog into new chunks with bounded-parallel
//!    completion calls.

pub mod backfill;
pub mod boundary;
pub mod cache;
pub mod coverage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message-id range within one chat. Derived per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub chat_id: i64,
    pub start_message_id: i64,
    pub end_message_id: i64,
}

impl ChunkRange {
    pub fn new(chat_id: i64, start_message_id: i64, end_message_id: i64) -> Self {
        Self {
            chat_id,
            start_message_id,
            end_message_id,
        }
    }

    /// Deterministic chunk id: `"{chat_id}_{start}_{end}"`.
    pub fn id(&self) -> String {
        chunk_id(self.chat_id, self.start_message_id, self.end_message_id)
    }
}

/// Deterministic chunk id for a boundary.
pub fn chunk_id(chat_id: i64, start_message_id: i64, end_message_id: i64) -> String {
    format!("{chat_id}_{start_message_id}_{end_message_id}")
}

/// A committed chunk: one stored summary for a contiguous message range.
///
/// Append-only. Once stored it is never mutated or deleted by the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub chunk_id: String,
    pub chat_id: i64,
    pub start_message_id: i64,
    pub end_message_id: i64,
    /// Number of source messages folded into the summary.
    pub message_count: usize,
    pub summary_text: String,
    pub created_at: DateTime<Utc>,
}

impl ChunkSummary {
    /// Whether the chunk's range intersects `[start, end]`.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start_message_id <= end && start <= self.end_message_id
    }
}
