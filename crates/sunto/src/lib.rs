//! Incremental, chunk-cached summarization of chat message streams.
//!
//! `sunto` answers "what happened in this chat between message A and message
//! B?" without re-reading history it has already summarized. Messages are cut
//! into fixed-size chunks as they arrive, each chunk is summarized once and
//! cached by its message-id boundaries, and a summary request is assembled
//! from the cached chunk summaries plus the short uncovered tail.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use sunto::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SuntoConfig::from_env();
//!     let client = CompletionClient::new(config.completion.clone())?;
//!
//!     let engine = SummaryEngine::new(
//!         config,
//!         Arc::new(InMemoryMessageLog::new()),
//!         Arc::new(InMemoryChunkStore::new()),
//!         Arc::new(client),
//!     );
//!
//!     // engine.ingest(message).await?;
//!     let text = engine.summarize(-1001234567890, 1, 500, "alice").await;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Cut messages into chunks:** [`chunking::boundary`].
//! - **Cache chunk summaries:** [`ChunkCache`](chunking::cache::ChunkCache)
//!   over a [`ChunkStore`](chunking::cache::ChunkStore); file-backed stores
//!   live in [`store`].
//! - **Find what still needs summarizing:** [`chunking::coverage`].
//! - **Keep the backlog small:** [`BackfillProcessor`](chunking::backfill::BackfillProcessor).
//! - **Answer a summary request:** [`SummaryAssembler`](summary::assembler::SummaryAssembler),
//!   or the [`SummaryEngine`](engine::SummaryEngine) facade.
//! - **Make model output safe to display:** [`sanitize`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chat`] | Message model, rendering, the [`MessageLog`](chat::log::MessageLog) collaborator, time ranges |
//! | [`chunking`] | Boundaries, chunk cache, coverage, backfill |
//! | [`summary`] | Prompts and cache-aware summary assembly |
//! | [`sanitize`] | Restricted, well-nested markup for the display surface |
//! | [`store`] | Append-only JSONL message log and chunk store |
//! | [`api`] | Retry with backoff, request ids |

pub mod api;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod sanitize;
pub mod store;
pub mod summary;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::CompletionConfig;
use crate::error::CompletionError;

// ── Constants ──────────────────────────────────────────────────────

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for all completion calls.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ── Completion service ─────────────────────────────────────────────

/// Boxed future returned by [`CompletionService::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;

/// A request/response text-completion endpoint.
///
/// The pipeline only ever needs one operation: send system instructions plus
/// a content block, get text back. Uses a boxed future so the trait stays
/// object-safe and can be shared as `Arc<dyn CompletionService>`.
pub trait CompletionService: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, content: &'a str) -> CompletionFuture<'a>;
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible subset).
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Role of a message in the completion request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in a completion request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`CompletionClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API.
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    /// Create a client from the completion settings.
    pub fn new(config: CompletionConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sunto/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Send a chat completion request.
    ///
    /// Errors are plain strings in the `"... HTTP {status}: ..."` /
    /// `"request failed: ..."` shape that [`api::retry::classify_error`]
    /// understands.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let mut request = self.client.post(self.endpoint()).json(body);
        if let Some(ref key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let resp = request
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("request failed: could not read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("completion API HTTP {}: {text}", status.as_u16()));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| format!("invalid response body: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("completion API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            },
        })
    }
}

impl CompletionService for CompletionClient {
    fn complete<'a>(&'a self, system: &'a str, content: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest {
                model: self.config.model.clone(),
                messages: vec![Message::system(system), Message::user(content)],
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };
            let completion = self
                .chat(&body)
                .await
                .map_err(|e| api::retry::classify_error(&e))?;
            match completion.content.map(|c| c.trim().to_string()) {
                Some(text) if !text.is_empty() => Ok(text),
                _ => Err(CompletionError::Permanent("empty completion".into())),
            }
        })
    }
}
