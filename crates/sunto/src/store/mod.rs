//! Durable collaborators: the JSONL message log and chunk store.

pub mod jsonl;

pub use jsonl::{CHUNKS_FILE, JsonlChunkStore, JsonlFile, JsonlMessageLog, MESSAGES_FILE};
