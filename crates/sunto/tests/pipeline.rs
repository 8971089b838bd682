//! End-to-end tests for the summarization pipeline.
//!
//! A scripted completion service answers by system prompt, so each test can
//! count chunk, reduce, and final calls separately.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use sunto::prelude::*;
use sunto::summary::prompt::{CHUNK_PROMPT, REDUCE_PROMPT};

const CHAT: i64 = -1001234567890;
const PERSONA: &str = "You summarize group chats.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Chunk,
    Reduce,
    Final,
}

/// Answers by call kind and records every call.
#[derive(Default)]
struct Scripted {
    calls: Mutex<Vec<(Kind, String)>>,
    /// Chunk calls whose input contains this message id fail.
    fail_message: Option<i64>,
    fail_final: bool,
    final_reply: Option<String>,
}

impl Scripted {
    fn count(&self, kind: Kind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn last(&self, kind: Kind) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, content)| content.clone())
    }
}

impl CompletionService for Scripted {
    fn complete<'a>(&'a self, system: &'a str, content: &'a str) -> CompletionFuture<'a> {
        let kind = if system == CHUNK_PROMPT {
            Kind::Chunk
        } else if system == REDUCE_PROMPT {
            Kind::Reduce
        } else {
            Kind::Final
        };
        self.calls.lock().unwrap().push((kind, content.to_string()));

        let result = match kind {
            Kind::Chunk => match self.fail_message {
                Some(id) if content.contains(&format!("[#{id} ")) => {
                    Err(CompletionError::Permanent("HTTP 400: bad chunk".into()))
                }
                _ => Ok(format!("chunk of {} line(s)", content.lines().count() - 1)),
            },
            Kind::Reduce => Ok("condensed".to_string()),
            Kind::Final if self.fail_final => {
                Err(CompletionError::Permanent("HTTP 401: unauthorized".into()))
            }
            Kind::Final => Ok(self
                .final_reply
                .clone()
                .unwrap_or_else(|| "Everyone agreed on **Friday**.".to_string())),
        };
        Box::pin(async move { result })
    }
}

fn config(chunk_size: usize) -> SuntoConfig {
    let mut config = SuntoConfig::default()
        .with_chunk_size(chunk_size)
        .with_backfill_every(0)
        .with_retry(RetryConfig::none());
    config.completion.system_prompt = PERSONA.to_string();
    config
}

fn log_with(n: i64) -> Arc<InMemoryMessageLog> {
    Arc::new(
        InMemoryMessageLog::with_messages(
            (1..=n).map(|i| ChatMessage::text(CHAT, i, "bob", format!("message {i}"), Utc::now())),
        )
        .unwrap(),
    )
}

fn engine(config: SuntoConfig, n: i64, completion: Arc<Scripted>) -> SummaryEngine {
    SummaryEngine::new(
        config,
        log_with(n),
        Arc::new(InMemoryChunkStore::new()),
        completion,
    )
}

// ── Backfill ────────────────────────────────────────────────────────

#[tokio::test]
async fn backfill_commits_full_chunks_and_leaves_the_tail() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(70).with_max_parallel(2), 150, completion.clone());

    assert_eq!(engine.ensure_processed(CHAT).await.unwrap(), 2);
    let chunks = engine.cache().get_all(CHAT).unwrap();
    let ranges: Vec<(i64, i64)> = chunks
        .iter()
        .map(|c| (c.start_message_id, c.end_message_id))
        .collect();
    assert_eq!(ranges, vec![(1, 70), (71, 140)]);
    assert_eq!(chunks[0].chunk_id, format!("{CHAT}_1_70"));
    assert_eq!(chunks[0].message_count, 70);

    let status = engine.status(CHAT).unwrap();
    assert_eq!(status.uncovered, 10);
    assert_eq!(completion.count(Kind::Chunk), 2);
}

#[tokio::test]
async fn backfill_is_idempotent() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(70), 150, completion.clone());

    engine.ensure_processed(CHAT).await.unwrap();
    assert_eq!(engine.ensure_processed(CHAT).await.unwrap(), 0);
    assert_eq!(engine.cache().get_all(CHAT).unwrap().len(), 2);
    assert_eq!(completion.count(Kind::Chunk), 2);
}

#[tokio::test]
async fn failed_chunk_does_not_block_its_neighbours() {
    let completion = Arc::new(Scripted {
        fail_message: Some(15),
        ..Default::default()
    });
    let engine = engine(config(10).with_max_parallel(3), 30, completion.clone());

    assert_eq!(engine.ensure_processed(CHAT).await.unwrap(), 2);
    let starts: Vec<i64> = engine
        .cache()
        .get_all(CHAT)
        .unwrap()
        .iter()
        .map(|c| c.start_message_id)
        .collect();
    assert_eq!(starts, vec![1, 21]);
    assert_eq!(engine.status(CHAT).unwrap().uncovered, 10);
}

// ── Assembly ────────────────────────────────────────────────────────

#[tokio::test]
async fn covered_range_sends_only_partial_summaries() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(70), 150, completion.clone());

    let text = engine.summarize(CHAT, 1, 140, "alice").await;
    assert_eq!(text, "Everyone agreed on <b>Friday</b>.");
    assert_eq!(completion.count(Kind::Chunk), 2);
    assert_eq!(completion.count(Kind::Final), 1);

    let status = engine.status(CHAT).unwrap();
    assert_eq!((status.cache_hits, status.cache_misses), (1, 0));

    let input = completion.last(Kind::Final).unwrap();
    assert!(input.contains("=== PARTIAL SUMMARY 1 ==="));
    assert!(input.contains("=== PARTIAL SUMMARY 2 ==="));
    assert!(!input.contains("RECENT MESSAGES"));
    assert!(!input.contains("[#"));
}

#[tokio::test]
async fn uncovered_tail_is_sent_raw() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(70), 150, completion.clone());

    engine.summarize(CHAT, 1, 150, "alice").await;
    let input = completion.last(Kind::Final).unwrap();
    assert!(input.contains("=== RECENT MESSAGES (10) ==="));
    assert!(input.contains("[#141 "));
    assert!(input.contains("[#150 "));
    assert!(!input.contains("[#140 "));
}

#[tokio::test]
async fn small_range_goes_direct() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(70), 20, completion.clone());

    engine.summarize(CHAT, 1, 20, "alice").await;
    assert_eq!(completion.count(Kind::Chunk), 0);
    assert_eq!(engine.status(CHAT).unwrap().cache_misses, 1);
    let input = completion.last(Kind::Final).unwrap();
    assert!(input.starts_with("Chat Summary Request"));
    assert!(input.contains("Total Messages: 20"));
}

#[tokio::test]
async fn many_chunks_are_reduced_before_the_final_call() {
    let completion = Arc::new(Scripted::default());
    let engine = engine(config(5), 60, completion.clone());

    engine.summarize(CHAT, 1, 60, "alice").await;
    assert_eq!(completion.count(Kind::Chunk), 12);
    assert_eq!(completion.count(Kind::Reduce), 2);

    let input = completion.last(Kind::Final).unwrap();
    assert!(input.contains("=== PARTIAL SUMMARY 2 ==="));
    assert!(!input.contains("=== PARTIAL SUMMARY 3 ==="));
}

#[tokio::test]
async fn final_failure_yields_placeholder() {
    let completion = Arc::new(Scripted {
        fail_final: true,
        ..Default::default()
    });
    let engine = engine(config(70), 20, completion);

    let text = engine.summarize(CHAT, 1, 20, "alice").await;
    assert_eq!(
        text,
        "Sorry, I couldn't generate a summary of messages #1 to #20 (20 messages) at this time. \
         Please try again later."
    );
}

#[tokio::test]
async fn citations_become_deep_links() {
    let completion = Arc::new(Scripted {
        final_reply: Some("Plans changed (see <a href=\"12\">this</a>).".to_string()),
        ..Default::default()
    });
    let engine = engine(config(70), 20, completion);

    let text = engine.summarize(CHAT, 1, 20, "alice").await;
    assert_eq!(
        text,
        "Plans changed (see <a href=\"https://t.me/c/1234567890/12\">this</a>)."
    );
}

// ── Persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn jsonl_backed_engine_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let completion = Arc::new(Scripted::default());

    {
        let engine = SummaryEngine::new(
            config(10).with_backfill_every(25),
            Arc::new(JsonlMessageLog::open_in(dir.path()).unwrap()),
            Arc::new(JsonlChunkStore::open_in(dir.path()).unwrap()),
            completion.clone(),
        );
        for i in 1..=25 {
            engine
                .ingest(ChatMessage::text(CHAT, i, "bob", format!("message {i}"), Utc::now()))
                .await
                .unwrap();
        }
        assert_eq!(engine.status(CHAT).unwrap().chunks, 2);
    }

    let engine = SummaryEngine::new(
        config(10),
        Arc::new(JsonlMessageLog::open_in(dir.path()).unwrap()),
        Arc::new(JsonlChunkStore::open_in(dir.path()).unwrap()),
        completion.clone(),
    );
    assert_eq!(
        engine.status(CHAT).unwrap(),
        ChatStatus {
            chat_id: CHAT,
            messages: 25,
            chunks: 2,
            uncovered: 5,
            cache_hits: 0,
            cache_misses: 0,
        }
    );
    assert_eq!(engine.ensure_processed(CHAT).await.unwrap(), 0);
    assert_eq!(completion.count(Kind::Chunk), 2);
}
