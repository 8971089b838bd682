//! Fixed-stride chunk boundaries.
//!
//! Walks an ascending message sequence in strides of `size` and emits one
//! slice per full stride. The trailing `len % size` messages are the
//! residual: never committable, re-evaluated on the next backfill pass.

use super::ChunkRange;
use crate::chat::ChatMessage;

/// A committable slice of exactly `size` messages.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSlice<'a> {
    pub range: ChunkRange,
    pub messages: &'a [ChatMessage],
}

/// Slice `messages` (sorted ascending by id) into full chunks of `size`.
///
/// Deterministic: the same input always yields the same ranges.
pub fn compute_boundaries(messages: &[ChatMessage], size: usize) -> Vec<ChunkSlice<'_>> {
    if size == 0 {
        return Vec::new();
    }
    messages
        .chunks_exact(size)
        .filter_map(|slice| {
            let (first, last) = (slice.first()?, slice.last()?);
            Some(ChunkSlice {
                range: ChunkRange::new(first.chat_id, first.message_id, last.message_id),
                messages: slice,
            })
        })
        .collect()
}

/// The messages left over after the last full chunk.
pub fn residual(messages: &[ChatMessage], size: usize) -> &[ChatMessage] {
    if size == 0 {
        return messages;
    }
    let full = messages.len() - messages.len() % size;
    messages.get(full..).unwrap_or_default()
}
