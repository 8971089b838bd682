//! Pipeline configuration with sensible defaults.
//!
//! [`SuntoConfig`] gathers the knobs of every stage: chunk size, backfill
//! fan-out width, reduction threshold, retry policy, and the completion
//! endpoint. Start from [`SuntoConfig::default()`] or
//! [`SuntoConfig::from_env()`] and adjust with the `with_*` builders.
//!
//! # Examples
//!
//! ```
//! use sunto::config::SuntoConfig;
//!
//! let config = SuntoConfig::default()
//!     .with_chunk_size(50)
//!     .with_max_parallel(4);
//! assert_eq!(config.chunk_size, 50);
//! ```

use tracing::warn;

use crate::api::retry::RetryConfig;
use crate::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Default persona for the final summary call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that creates personalized chat summaries. \
You will receive messages from a group chat and need to provide a concise \
summary tailored for the requesting user. \
Guidelines: \
- Focus on information most relevant to the requesting user \
- Highlight key discussions, decisions, and action items \
- Mention when the user was directly addressed or mentioned \
- Keep summaries concise (2-3 paragraphs maximum) \
- Use a friendly, conversational tone \
- If no significant activity occurred, mention this briefly";

/// What to do when the cached chunk set is still too large after one
/// reduction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionPolicy {
    /// Reduce once and proceed, logging a warning if still oversized.
    #[default]
    SingleLevel,
    /// Keep reducing until the set fits under the threshold.
    Recursive,
}

/// Settings for the completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// OpenAI-compatible API root. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Bearer token. `None` sends no `Authorization` header (local servers).
    pub api_key: Option<String>,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Maximum tokens per response. Default: `500`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
    /// Persona used for the final, user-facing summary.
    pub system_prompt: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 500,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Configuration for the whole summarization pipeline.
#[derive(Debug, Clone)]
pub struct SuntoConfig {
    /// Messages per committed chunk. Default: `70`.
    pub chunk_size: usize,
    /// Chunks summarized concurrently per backfill pass. Default: `2`.
    pub max_parallel: usize,
    /// Cached-chunk count above which a reduction pass runs. Default: `10`.
    pub reduce_threshold: usize,
    /// Upper bound on messages fetched for coverage. Default: `100_000`.
    pub history_cap: usize,
    /// Run a backfill every N ingested messages per chat. `0` disables.
    /// Default: `50`.
    pub backfill_every: u64,
    /// Consecutive zero-commit backfill passes tolerated before giving up.
    /// Default: `3`.
    pub max_idle_passes: u32,
    /// Behavior when reduction leaves the set oversized.
    pub reduction: ReductionPolicy,
    /// Retry policy for every completion call.
    pub retry: RetryConfig,
    /// Completion endpoint settings.
    pub completion: CompletionConfig,
}

impl Default for SuntoConfig {
    fn default() -> Self {
        Self {
            chunk_size: 70,
            max_parallel: 2,
            reduce_threshold: 10,
            history_cap: 100_000,
            backfill_every: 50,
            max_idle_passes: 3,
            reduction: ReductionPolicy::default(),
            retry: RetryConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl SuntoConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// Reads `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `SUNTO_MODEL`,
    /// `SYSTEM_PROMPT`, `SUNTO_CHUNK_SIZE`, `SUNTO_MAX_PARALLEL`,
    /// `SUNTO_REDUCE_THRESHOLD`, and `SUNTO_BACKFILL_EVERY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OPENAI_BASE_URL") {
            config.completion.base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            config.completion.api_key = Some(key);
        }
        if let Some(model) = get("SUNTO_MODEL") {
            config.completion.model = model;
        }
        if let Some(prompt) = get("SYSTEM_PROMPT") {
            config.completion.system_prompt = prompt;
        }
        if let Some(n) = parse_positive(&get, "SUNTO_CHUNK_SIZE") {
            config.chunk_size = n;
        }
        if let Some(n) = parse_positive(&get, "SUNTO_MAX_PARALLEL") {
            config.max_parallel = n;
        }
        if let Some(n) = parse_positive(&get, "SUNTO_REDUCE_THRESHOLD") {
            config.reduce_threshold = n;
        }
        if let Some(raw) = get("SUNTO_BACKFILL_EVERY") {
            match raw.trim().parse::<u64>() {
                Ok(n) => config.backfill_every = n,
                Err(_) => warn!("Ignoring SUNTO_BACKFILL_EVERY={raw:?}: not a number"),
            }
        }
        config
    }

    /// Set the chunk size (clamped to at least 1).
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the backfill fan-out width (clamped to at least 1).
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    /// Set the reduction threshold (clamped to at least 2).
    pub fn with_reduce_threshold(mut self, n: usize) -> Self {
        self.reduce_threshold = n.max(2);
        self
    }

    /// Set the ingestion interval that triggers a backfill.
    pub fn with_backfill_every(mut self, n: u64) -> Self {
        self.backfill_every = n;
        self
    }

    /// Set the reduction policy.
    pub fn with_reduction(mut self, policy: ReductionPolicy) -> Self {
        self.reduction = policy;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the completion endpoint settings.
    pub fn with_completion(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }
}

fn parse_positive(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = get(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!("Ignoring {key}={raw:?}: expected a positive integer");
            None
        }
    }
}
