//! Convenience re-exports for common `sunto` types.
//!
//! Meant to be glob-imported when wiring the pipeline into a bot:
//!
//! ```ignore
//! use sunto::prelude::*;
//! ```
//!
//! This pulls in the configuration, the completion client and trait, the
//! message and chunk collaborators with their in-memory and JSONL
//! implementations, and the [`SummaryEngine`] facade. Prompt text and the
//! individual sanitizer passes are not re-exported; import those from their
//! modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{CompletionClient, CompletionFuture, CompletionService};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::api::RetryConfig;
pub use crate::config::{CompletionConfig, ReductionPolicy, SuntoConfig};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{CompletionError, StoreError, SummaryError};

// ── Messages ────────────────────────────────────────────────────────
pub use crate::chat::log::{InMemoryMessageLog, MessageLog};
pub use crate::chat::time_range::{describe_interval, parse_interval};
pub use crate::chat::{ChatMessage, MessageContent};

// ── Chunks ──────────────────────────────────────────────────────────
pub use crate::chunking::cache::{ChunkCache, ChunkStore, InMemoryChunkStore};
pub use crate::chunking::{ChunkRange, ChunkSummary};
pub use crate::store::{JsonlChunkStore, JsonlMessageLog};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::engine::{ChatStatus, SummaryEngine};
pub use crate::sanitize::OutputSanitizer;
pub use crate::summary::SummaryRequest;
