//! [`SummaryEngine`]: the pipeline wired together behind one handle.
//!
//! Owns the message log, chunk cache, backfill processor, assembler, and
//! sanitizer for a single completion service. The bot or CLI layer talks
//! only to this type.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::CompletionService;
use crate::chat::ChatMessage;
use crate::chat::log::MessageLog;
use crate::chat::time_range::describe_interval;
use crate::chunking::backfill::{BackfillConfig, BackfillProcessor};
use crate::chunking::cache::{ChunkCache, ChunkStore};
use crate::chunking::coverage::CoverageTracker;
use crate::config::SuntoConfig;
use crate::error::{StoreError, SummaryError};
use crate::sanitize::OutputSanitizer;
use crate::summary::assembler::{AssemblerConfig, no_messages_text};
use crate::summary::{SummaryAssembler, SummaryRequest};

/// Window used when the requester has never written in the chat.
const SINCE_LAST_FALLBACK_HOURS: i64 = 24;

/// Per-chat coverage snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStatus {
    pub chat_id: i64,
    /// Messages within the history cap.
    pub messages: usize,
    pub chunks: usize,
    pub uncovered: usize,
    /// Overlap lookups served from cached chunks since startup, all chats.
    pub cache_hits: u64,
    pub cache_misses: u64,
}

pub struct SummaryEngine {
    config: SuntoConfig,
    log: Arc<dyn MessageLog>,
    cache: ChunkCache,
    coverage: CoverageTracker,
    backfill: Arc<BackfillProcessor>,
    assembler: SummaryAssembler,
    sanitizer: OutputSanitizer,
    /// Messages ingested per chat since startup.
    ingested: Mutex<HashMap<i64, u64>>,
}

impl SummaryEngine {
    pub fn new(
        config: SuntoConfig,
        log: Arc<dyn MessageLog>,
        store: Arc<dyn ChunkStore>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let cache = ChunkCache::new(store);
        let coverage = CoverageTracker::new(log.clone(), cache.clone(), config.history_cap);
        let backfill = Arc::new(BackfillProcessor::new(
            coverage.clone(),
            cache.clone(),
            completion.clone(),
            BackfillConfig::from(&config),
        ));
        let assembler = SummaryAssembler::new(
            backfill.clone(),
            cache.clone(),
            coverage.clone(),
            log.clone(),
            completion,
            AssemblerConfig::from(&config),
        );
        Self {
            config,
            log,
            cache,
            coverage,
            backfill,
            assembler,
            sanitizer: OutputSanitizer::new(),
            ingested: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SuntoConfig {
        &self.config
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Append a message; every `backfill_every` messages per chat, run a
    /// backfill. Returns the chunks committed, if a backfill ran.
    pub async fn ingest(&self, message: ChatMessage) -> Result<Option<usize>, StoreError> {
        let chat_id = message.chat_id;
        self.log.append(message)?;

        let every = self.config.backfill_every;
        if every == 0 {
            return Ok(None);
        }
        let count = {
            let mut ingested = self.ingested.lock().map_err(|_| StoreError::Poisoned)?;
            let count = ingested.entry(chat_id).or_insert(0);
            *count += 1;
            *count
        };
        if count % every != 0 {
            return Ok(None);
        }

        debug!("Chat {chat_id}: {count} messages ingested, running backfill");
        self.backfill.ensure_processed(chat_id).await.map(Some)
    }

    /// Summarize every full chunk of the chat's uncovered backlog.
    pub async fn ensure_processed(&self, chat_id: i64) -> Result<usize, StoreError> {
        self.backfill.ensure_processed(chat_id).await
    }

    /// Sanitized summary of `[start_id, end_id]`, or a placeholder on failure.
    pub async fn summarize(
        &self,
        chat_id: i64,
        start_id: i64,
        end_id: i64,
        requester: &str,
    ) -> String {
        self.assembler
            .summarize(chat_id, start_id, end_id, requester)
            .await
    }

    pub async fn summarize_request(&self, request: &SummaryRequest) -> String {
        self.assembler.summarize_request(request).await
    }

    pub async fn try_summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        self.assembler.try_summarize(request).await
    }

    /// Summary of the last `since` of chat activity.
    pub async fn summarize_since(&self, chat_id: i64, since: Duration, requester: &str) -> String {
        let to = Utc::now();
        let description = describe_interval(since);
        self.summarize_window(chat_id, to - since, to, &description, requester)
            .await
    }

    /// Summary of everything after the requester's own latest message, or
    /// of the last 24 hours if they have none.
    pub async fn summarize_since_last_message(&self, chat_id: i64, requester: &str) -> String {
        let last = match self.log.last_by_author(chat_id, requester) {
            Ok(last) => last,
            Err(e) => {
                error!("Failed to look up last message of {requester} in chat {chat_id}: {e}");
                return unavailable_text();
            }
        };

        match last {
            Some(own) => {
                let latest = match self.log.recent(chat_id, 1) {
                    Ok(latest) => latest.last().map(|m| m.message_id),
                    Err(e) => {
                        error!("Failed to read chat {chat_id}: {e}");
                        return unavailable_text();
                    }
                };
                let description = "since your last message";
                match latest {
                    Some(end) if end > own.message_id => {
                        let request =
                            SummaryRequest::new(chat_id, own.message_id + 1, end, requester)
                                .with_time_range(description);
                        self.assembler.summarize_request(&request).await
                    }
                    _ => no_messages_text(description),
                }
            }
            None => {
                let since = Duration::hours(SINCE_LAST_FALLBACK_HOURS);
                self.summarize_since(chat_id, since, requester).await
            }
        }
    }

    async fn summarize_window(
        &self,
        chat_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        description: &str,
        requester: &str,
    ) -> String {
        let messages = match self.log.range_by_time(chat_id, from, to) {
            Ok(messages) => messages,
            Err(e) => {
                error!("Failed to read chat {chat_id} window: {e}");
                return unavailable_text();
            }
        };
        let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
            return no_messages_text(description);
        };
        info!(
            "Chat {chat_id}: {} message(s) in {description} (#{}-#{})",
            messages.len(),
            first.message_id,
            last.message_id
        );
        let request = SummaryRequest::new(chat_id, first.message_id, last.message_id, requester)
            .with_time_range(description);
        self.assembler.summarize_request(&request).await
    }

    /// Coverage counts for one chat.
    pub fn status(&self, chat_id: i64) -> Result<ChatStatus, StoreError> {
        Ok(ChatStatus {
            chat_id,
            messages: self.log.recent(chat_id, self.config.history_cap)?.len(),
            chunks: self.cache.get_all(chat_id)?.len(),
            uncovered: self.coverage.uncovered(chat_id)?.len(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        })
    }

    /// Sanitize arbitrary text for display in `chat_id`.
    pub fn sanitize(&self, text: &str, chat_id: Option<i64>) -> String {
        self.sanitizer.sanitize(text, chat_id)
    }
}

fn unavailable_text() -> String {
    "Sorry, I couldn't read the chat history right now. Please try again later.".to_string()
}
