//! Completion-call plumbing shared by backfill and assembly.
//!
//! - [`retry`]: transient/permanent classification and bounded exponential
//!   backoff around every completion call.
//! - [`tracing`]: request ids for grouping one summary request's logs.

pub mod retry;
pub mod tracing;

pub use retry::{RetryConfig, retry_completion};
pub use tracing::generate_request_id;
