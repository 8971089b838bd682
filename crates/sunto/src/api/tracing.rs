//! Correlation ids for summary requests.
//!
//! Every [`SummaryAssembler`](crate::summary::assembler::SummaryAssembler)
//! request runs inside a tracing span tagged with a `request_id`, so the
//! backfill, reduction, and final completion logs of one request can be
//! grouped together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique id for a summary request.
pub fn generate_request_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter handles calls within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sr-{ts:x}-{count:04x}")
}
