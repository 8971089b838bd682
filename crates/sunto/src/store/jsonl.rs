//! Append-only JSONL persistence.
//!
//! One record per line. Files are read once at open into the in-memory
//! implementations, and every later insert appends one line *before* the
//! in-memory index is updated, so a failed write leaves no trace.
//!
//! ```text
//! data_dir/
//!   messages.jsonl
//!   chunks.jsonl
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::chat::ChatMessage;
use crate::chat::log::{InMemoryMessageLog, MessageLog};
use crate::chunking::ChunkSummary;
use crate::chunking::cache::{ChunkStore, InMemoryChunkStore};
use crate::error::StoreError;

/// File name of the message log inside a data directory.
pub const MESSAGES_FILE: &str = "messages.jsonl";
/// File name of the chunk store inside a data directory.
pub const CHUNKS_FILE: &str = "chunks.jsonl";

// ── JsonlFile ──────────────────────────────────────────────────────

/// A JSONL file of `T` records with serialized appends.
#[derive(Debug)]
pub struct JsonlFile<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonlFile<T> {
    /// Create the parent directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is empty. Unparseable lines are
    /// skipped with a warning (a torn final line after a crash, usually).
    pub fn load(&self) -> Result<Vec<T>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed line {} of {}: {e}",
                    idx + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }

    /// Append one record and flush it to disk.
    pub fn append(&self, record: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

// ── JsonlChunkStore ────────────────────────────────────────────────

/// File-backed [`ChunkStore`].
pub struct JsonlChunkStore {
    file: JsonlFile<ChunkSummary>,
    index: InMemoryChunkStore,
    insert_lock: Mutex<()>,
}

impl JsonlChunkStore {
    /// Open (or create) the store at `path` and load existing chunks.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = JsonlFile::new(path)?;
        let index = InMemoryChunkStore::new();
        let mut loaded = 0;
        for chunk in file.load()? {
            match index.insert(chunk) {
                Ok(()) => loaded += 1,
                Err(StoreError::DuplicateChunk(id)) => {
                    warn!("Ignoring repeated chunk {id} in {}", file.path().display());
                }
                Err(e) => return Err(e),
            }
        }
        debug!("Loaded {loaded} chunk(s) from {}", file.path().display());
        Ok(Self {
            file,
            index,
            insert_lock: Mutex::new(()),
        })
    }

    /// Open `chunks.jsonl` inside `dir`.
    pub fn open_in(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(CHUNKS_FILE))
    }
}

impl ChunkStore for JsonlChunkStore {
    fn insert(&self, chunk: ChunkSummary) -> Result<(), StoreError> {
        let _guard = self.insert_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if self.index.contains(chunk.chat_id, &chunk.chunk_id)? {
            return Err(StoreError::DuplicateChunk(chunk.chunk_id));
        }
        self.file.append(&chunk)?;
        self.index.insert(chunk)
    }

    fn overlapping(
        &self,
        chat_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkSummary>, StoreError> {
        self.index.overlapping(chat_id, start, end)
    }

    fn all(&self, chat_id: i64) -> Result<Vec<ChunkSummary>, StoreError> {
        self.index.all(chat_id)
    }
}

// ── JsonlMessageLog ────────────────────────────────────────────────

/// File-backed [`MessageLog`].
pub struct JsonlMessageLog {
    file: JsonlFile<ChatMessage>,
    index: InMemoryMessageLog,
    append_lock: Mutex<()>,
}

impl JsonlMessageLog {
    /// Open (or create) the log at `path` and load existing messages.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = JsonlFile::new(path)?;
        let index = InMemoryMessageLog::new();
        for message in file.load()? {
            match index.append(message) {
                Ok(()) => {}
                Err(StoreError::DuplicateMessage {
                    chat_id,
                    message_id,
                }) => warn!(
                    "Ignoring repeated message {message_id} of chat {chat_id} in {}",
                    file.path().display()
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(Self {
            file,
            index,
            append_lock: Mutex::new(()),
        })
    }

    /// Open `messages.jsonl` inside `dir`.
    pub fn open_in(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(MESSAGES_FILE))
    }

    /// Number of messages stored for a chat.
    pub fn len(&self, chat_id: i64) -> usize {
        self.index.len(chat_id)
    }

    /// Every chat with at least one message.
    pub fn chat_ids(&self) -> Vec<i64> {
        self.index.chat_ids()
    }
}

impl MessageLog for JsonlMessageLog {
    fn append(&self, message: ChatMessage) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if self.index.contains(message.chat_id, message.message_id)? {
            return Err(StoreError::DuplicateMessage {
                chat_id: message.chat_id,
                message_id: message.message_id,
            });
        }
        self.file.append(&message)?;
        self.index.append(message)
    }

    fn range_by_id(
        &self,
        chat_id: i64,
        from_id: i64,
        to_id: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.index.range_by_id(chat_id, from_id, to_id)
    }

    fn range_by_time(
        &self,
        chat_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.index.range_by_time(chat_id, from, to)
    }

    fn recent(&self, chat_id: i64, cap: usize) -> Result<Vec<ChatMessage>, StoreError> {
        self.index.recent(chat_id, cap)
    }

    fn last_by_author(
        &self,
        chat_id: i64,
        author: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        self.index.last_by_author(chat_id, author)
    }
}
