//! Summary assembly: prompts and the cache-aware [`SummaryAssembler`].

pub mod assembler;
pub mod prompt;

pub use assembler::{SummaryAssembler, SummaryRequest};
