//! Backfill: turn the uncovered backlog of a chat into cached chunks.
//!
//! [`BackfillProcessor::ensure_processed`] repeats one pass until fewer
//! than `chunk_size` messages remain uncovered:
//!
//! 1. compute the uncovered messages,
//! 2. take the oldest `parallelism * chunk_size` of them, where
//!    `parallelism = min(uncovered / chunk_size, max_parallel)`,
//! 3. slice them into disjoint chunks and summarize all of them
//!    concurrently, committing each to the [`ChunkCache`],
//! 4. join, then loop.
//!
//! Chunk boundaries are fixed before dispatch, so completion order never
//! changes which chunk owns which messages. A failed completion costs only
//! its own chunk, which stays uncovered and is retried on the next pass.
//! Storage failures abort the backfill once the pass has joined.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::ChunkSummary;
use super::boundary::{ChunkSlice, compute_boundaries};
use super::cache::ChunkCache;
use super::coverage::CoverageTracker;
use crate::CompletionService;
use crate::api::retry::{RetryConfig, retry_completion};
use crate::config::SuntoConfig;
use crate::error::{StoreError, SummaryError};
use crate::summary::prompt::{CHUNK_PROMPT, chunk_input};

/// Settings for one [`BackfillProcessor`].
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub chunk_size: usize,
    pub max_parallel: usize,
    pub max_idle_passes: u32,
    pub retry: RetryConfig,
}

impl From<&SuntoConfig> for BackfillConfig {
    fn from(config: &SuntoConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            max_parallel: config.max_parallel.max(1),
            max_idle_passes: config.max_idle_passes.max(1),
            retry: config.retry.clone(),
        }
    }
}

/// Keeps the uncovered tail of each chat shorter than one chunk.
pub struct BackfillProcessor {
    coverage: CoverageTracker,
    cache: ChunkCache,
    completion: Arc<dyn CompletionService>,
    config: BackfillConfig,
    /// Single-flight lock per chat.
    chat_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl BackfillProcessor {
    pub fn new(
        coverage: CoverageTracker,
        cache: ChunkCache,
        completion: Arc<dyn CompletionService>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            coverage,
            cache,
            completion,
            config,
            chat_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    fn chat_lock(&self, chat_id: i64) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self.chat_locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.entry(chat_id).or_default().clone())
    }

    /// Summarize and commit every full chunk of uncovered messages.
    ///
    /// Returns the number of chunks committed. Concurrent calls for the same
    /// chat are serialized. Stops early after `max_idle_passes` consecutive
    /// passes that commit nothing.
    pub async fn ensure_processed(&self, chat_id: i64) -> Result<usize, StoreError> {
        let lock = self.chat_lock(chat_id)?;
        let _guard = lock.lock().await;

        let size = self.config.chunk_size;
        let mut committed = 0;
        let mut idle_passes = 0;

        loop {
            let uncovered = self.coverage.uncovered(chat_id)?;
            if uncovered.len() < size {
                debug!(
                    "Backfill chat {chat_id}: {} uncovered message(s), below chunk size {size}",
                    uncovered.len()
                );
                break;
            }

            let parallelism = (uncovered.len() / size).min(self.config.max_parallel);
            let batch = uncovered.get(..parallelism * size).unwrap_or_default();
            let slices = compute_boundaries(batch, size);
            debug!(
                "Backfill chat {chat_id}: dispatching {} chunk(s) of {size} ({} uncovered)",
                slices.len(),
                uncovered.len()
            );

            let results = join_all(slices.iter().map(|slice| self.summarize_chunk(slice))).await;

            let mut pass_committed = 0;
            let mut store_failure = None;
            for (slice, result) in slices.iter().zip(results) {
                match result {
                    Ok(chunk) => {
                        pass_committed += 1;
                        info!(
                            "Committed chunk {} ({} messages)",
                            chunk.chunk_id, chunk.message_count
                        );
                    }
                    Err(SummaryError::Completion(e)) => {
                        warn!(
                            "Chunk {} not summarized, deferring to next pass: {e}",
                            slice.range.id()
                        );
                    }
                    Err(SummaryError::Store(e)) => {
                        if let StoreError::DuplicateChunk(ref id) = e {
                            error!("Chunk {id} was already committed: concurrent backfill race");
                        } else {
                            error!("Failed to store chunk {}: {e}", slice.range.id());
                        }
                        store_failure.get_or_insert(e);
                    }
                }
            }
            committed += pass_committed;

            if let Some(e) = store_failure {
                return Err(e);
            }

            if pass_committed == 0 {
                idle_passes += 1;
                if idle_passes >= self.config.max_idle_passes {
                    warn!(
                        "Backfill chat {chat_id}: giving up after {idle_passes} pass(es) without progress"
                    );
                    break;
                }
            } else {
                idle_passes = 0;
            }
        }

        Ok(committed)
    }

    /// One backfill task: summarize a chunk and commit it.
    async fn summarize_chunk(&self, slice: &ChunkSlice<'_>) -> Result<ChunkSummary, SummaryError> {
        let content = chunk_input(slice.messages);
        let summary = retry_completion(&self.config.retry, || {
            self.completion.complete(CHUNK_PROMPT, &content)
        })
        .await?;

        let range = slice.range;
        let chunk = self.cache.put(
            &range.id(),
            range.chat_id,
            range.start_message_id,
            range.end_message_id,
            slice.messages.len(),
            summary,
        )?;
        Ok(chunk)
    }
}
