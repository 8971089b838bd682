//! Builds a user-facing summary for a message-id range.
//!
//! The assembler first lets backfill catch up, then combines whatever is
//! cached for the range with the raw uncovered tail:
//!
//! - no cached chunks and an empty tail: a fixed "no messages" reply, no
//!   completion call at all;
//! - no cached chunks: one direct call over the raw tail;
//! - cached chunks: an optional reduction pass (groups of
//!   `reduce_threshold`), then one final "combine" call.
//!
//! Completion calls here are strictly sequential. Every result is
//! sanitized. [`SummaryAssembler::summarize`] never fails: errors become a
//! placeholder naming the range and its message count.

use std::sync::Arc;

use tracing::{Span, debug, error, info, instrument, warn};

use super::prompt::{
    REDUCE_PROMPT, RequestContext, combine_input, combine_system_prompt, direct_input,
    direct_system_prompt, reduce_input,
};
use crate::CompletionService;
use crate::api::generate_request_id;
use crate::api::retry::{RetryConfig, retry_completion};
use crate::chat::log::MessageLog;
use crate::chunking::backfill::BackfillProcessor;
use crate::chunking::cache::ChunkCache;
use crate::chunking::coverage::CoverageTracker;
use crate::config::{ReductionPolicy, SuntoConfig};
use crate::error::{CompletionError, SummaryError};
use crate::sanitize::OutputSanitizer;

/// One summary request.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub chat_id: i64,
    pub start_id: i64,
    pub end_id: i64,
    pub requester: String,
    /// Human description of the period, e.g. "Last 2 hours".
    pub time_range: String,
}

impl SummaryRequest {
    /// A request described by its message-id range.
    pub fn new(chat_id: i64, start_id: i64, end_id: i64, requester: impl Into<String>) -> Self {
        Self {
            chat_id,
            start_id,
            end_id,
            requester: requester.into(),
            time_range: format!("messages #{start_id} to #{end_id}"),
        }
    }

    pub fn with_time_range(mut self, description: impl Into<String>) -> Self {
        self.time_range = description.into();
        self
    }
}

/// Text returned when the range holds no messages.
pub fn no_messages_text(time_range: &str) -> String {
    format!("No messages found in the specified time period ({time_range}).")
}

/// Text returned when a summary could not be produced.
pub fn placeholder_text(request: &SummaryRequest, message_count: usize) -> String {
    format!(
        "Sorry, I couldn't generate a summary of messages #{} to #{} ({} messages) at this time. \
         Please try again later.",
        request.start_id, request.end_id, message_count
    )
}

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub reduce_threshold: usize,
    pub reduction: ReductionPolicy,
    pub retry: RetryConfig,
    /// Persona for the final call.
    pub system_prompt: String,
}

impl From<&SuntoConfig> for AssemblerConfig {
    fn from(config: &SuntoConfig) -> Self {
        Self {
            reduce_threshold: config.reduce_threshold.max(2),
            reduction: config.reduction,
            retry: config.retry.clone(),
            system_prompt: config.completion.system_prompt.clone(),
        }
    }
}

pub struct SummaryAssembler {
    backfill: Arc<BackfillProcessor>,
    cache: ChunkCache,
    coverage: CoverageTracker,
    log: Arc<dyn MessageLog>,
    completion: Arc<dyn CompletionService>,
    sanitizer: OutputSanitizer,
    config: AssemblerConfig,
}

impl SummaryAssembler {
    pub fn new(
        backfill: Arc<BackfillProcessor>,
        cache: ChunkCache,
        coverage: CoverageTracker,
        log: Arc<dyn MessageLog>,
        completion: Arc<dyn CompletionService>,
        config: AssemblerConfig,
    ) -> Self {
        Self {
            backfill,
            cache,
            coverage,
            log,
            completion,
            sanitizer: OutputSanitizer::new(),
            config,
        }
    }

    /// Sanitized summary of `[start_id, end_id]`, or a placeholder on failure.
    pub async fn summarize(
        &self,
        chat_id: i64,
        start_id: i64,
        end_id: i64,
        requester: &str,
    ) -> String {
        self.summarize_request(&SummaryRequest::new(chat_id, start_id, end_id, requester))
            .await
    }

    /// [`summarize`](Self::summarize) for a fully described request.
    pub async fn summarize_request(&self, request: &SummaryRequest) -> String {
        match self.try_summarize(request).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    "Failed to summarize chat {} messages #{}-#{}: {e}",
                    request.chat_id, request.start_id, request.end_id
                );
                let count = self
                    .log
                    .range_by_id(request.chat_id, request.start_id, request.end_id)
                    .map(|messages| messages.len())
                    .unwrap_or_default();
                placeholder_text(request, count)
            }
        }
    }

    /// Like [`summarize_request`](Self::summarize_request) but surfaces the error.
    #[instrument(
        skip(self, request),
        fields(
            request_id,
            chat_id = request.chat_id,
            start_id = request.start_id,
            end_id = request.end_id
        )
    )]
    pub async fn try_summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        let request_id = generate_request_id();
        Span::current().record("request_id", request_id.as_str());

        let chat_id = request.chat_id;
        let committed = self.backfill.ensure_processed(chat_id).await?;
        if committed > 0 {
            debug!("Backfill committed {committed} chunk(s) before summarizing");
        }

        let cached = self
            .cache
            .get_overlapping(chat_id, request.start_id, request.end_id)?;
        debug!(
            hits = self.cache.hits(),
            misses = self.cache.misses(),
            "Chunk cache hit rate {:.2}",
            self.cache.hit_rate()
        );
        let tail = self
            .coverage
            .uncovered_in(chat_id, request.start_id, request.end_id)?;
        let ctx = RequestContext {
            requester: &request.requester,
            time_range: &request.time_range,
        };

        let raw = if cached.is_empty() {
            if tail.is_empty() {
                info!("No messages in range");
                return Ok(no_messages_text(&request.time_range));
            }
            debug!("No cached chunks, summarizing {} raw message(s) directly", tail.len());
            let system = direct_system_prompt(&self.config.system_prompt, &ctx);
            let input = direct_input(&tail, &ctx);
            self.complete(&system, &input).await?
        } else {
            debug!(
                "Combining {} cached chunk(s) with {} raw message(s)",
                cached.len(),
                tail.len()
            );
            let partials = self
                .reduce(cached.into_iter().map(|c| c.summary_text).collect())
                .await?;
            let system = combine_system_prompt(&self.config.system_prompt, &ctx);
            let input = combine_input(&partials, &tail, &ctx);
            self.complete(&system, &input).await?
        };

        let text = self.sanitizer.sanitize(&raw, Some(chat_id));
        info!("Summary ready ({} chars)", text.len());
        Ok(text)
    }

    /// Shrink the partial summaries when there are more than
    /// `reduce_threshold` of them.
    async fn reduce(&self, mut partials: Vec<String>) -> Result<Vec<String>, CompletionError> {
        let threshold = self.config.reduce_threshold.max(2);
        let mut level = 0;
        while partials.len() > threshold {
            level += 1;
            let mut reduced = Vec::with_capacity(partials.len().div_ceil(threshold));
            for group in partials.chunks(threshold) {
                reduced.push(self.complete(REDUCE_PROMPT, &reduce_input(group)).await?);
            }
            debug!(
                "Reduction level {level}: {} partial(s) -> {}",
                partials.len(),
                reduced.len()
            );
            partials = reduced;

            if partials.len() > threshold && self.config.reduction == ReductionPolicy::SingleLevel {
                warn!(
                    "{} partial summaries remain after one reduction level (threshold {threshold}), \
                     proceeding anyway",
                    partials.len()
                );
                break;
            }
        }
        Ok(partials)
    }

    async fn complete(&self, system: &str, content: &str) -> Result<String, CompletionError> {
        retry_completion(&self.config.retry, || self.completion.complete(system, content)).await
    }
}
