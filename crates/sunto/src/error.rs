//! Error types shared across the pipeline.

use thiserror::Error;

/// Failure of a single completion call.
///
/// The split drives the retry policy: only [`Transient`](Self::Transient)
/// failures are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("transient completion failure: {0}")]
    Transient(String),
    #[error("permanent completion failure: {0}")]
    Permanent(String),
}

impl CompletionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure of the message log or the chunk store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A chunk with this id is already stored. Signals two backfills racing
    /// over the same boundary.
    #[error("chunk {0} already exists")]
    DuplicateChunk(String),
    #[error("message {message_id} already exists in chat {chat_id}")]
    DuplicateMessage { chat_id: i64, message_id: i64 },
    #[error("invalid chunk {chunk_id}: {reason}")]
    InvalidChunk { chunk_id: String, reason: String },
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Failure of a summary request, for callers that want the cause rather
/// than the placeholder text.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
