//! Feed chat history into the summarization pipeline and ask for summaries.
//!
//! Messages and chunk summaries live as JSONL files in `--data-dir`. The
//! completion endpoint is configured through `OPENAI_BASE_URL`,
//! `OPENAI_API_KEY`, and `SUNTO_MODEL` (or the matching flags).
//!
//! # Examples
//!
//! ```sh
//! # Load an export (one ChatMessage JSON object per line)
//! sunto ingest export.jsonl
//!
//! # Summarize the chat backlog in full chunks
//! sunto backfill --chat -1001234567890
//!
//! # Summary of a message range
//! sunto summarize --chat -1001234567890 --from 1 --to 500 --requester alice
//!
//! # Summary of the last two hours
//! sunto summarize --chat -1001234567890 --since 2h
//!
//! # Everything since alice last wrote
//! sunto summarize --chat -1001234567890 --since-last --requester alice
//!
//! # Clean up model output for display
//! cat reply.md | sunto sanitize --chat -1001234567890
//!
//! # Coverage per chat
//! sunto status
//! ```

use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use sunto::chat::ChatMessage;
use sunto::chat::log::MessageLog;
use sunto::chat::time_range::parse_interval;
use sunto::config::{ReductionPolicy, SuntoConfig};
use sunto::engine::SummaryEngine;
use sunto::error::StoreError;
use sunto::store::{JsonlChunkStore, JsonlMessageLog};
use sunto::summary::SummaryRequest;
use sunto::{CompletionClient, CompletionService};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Incremental, chunk-cached chat summarization.
#[derive(Parser)]
#[command(name = "sunto", version)]
struct Cli {
    // ── Storage ────────────────────────────────────────────────
    /// Directory holding messages.jsonl and chunks.jsonl
    #[arg(long, env = "SUNTO_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    // ── Completion endpoint ────────────────────────────────────
    /// OpenAI-compatible API root (overrides OPENAI_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model identifier (overrides SUNTO_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    // ── Pipeline tuning ────────────────────────────────────────
    /// Messages per chunk (overrides SUNTO_CHUNK_SIZE)
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Chunks summarized concurrently per backfill pass
    #[arg(long, global = true)]
    max_parallel: Option<usize>,

    /// Cached-chunk count above which partial summaries are reduced
    #[arg(long, global = true)]
    reduce_threshold: Option<usize>,

    /// Keep reducing until the partial summaries fit the threshold
    #[arg(long, global = true)]
    recursive_reduce: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append messages from a JSONL file ("-" for stdin)
    Ingest {
        file: String,

        /// Only store messages; skip the periodic backfill
        #[arg(long)]
        no_backfill: bool,
    },
    /// Summarize every full chunk of uncovered history
    Backfill {
        /// Chat to process (all known chats when omitted)
        #[arg(long, allow_hyphen_values = true)]
        chat: Option<i64>,
    },
    /// Produce a summary for a message range or time window
    Summarize(SummarizeArgs),
    /// Sanitize model output read from stdin
    Sanitize {
        /// Chat whose message references become deep links
        #[arg(long, allow_hyphen_values = true)]
        chat: Option<i64>,
    },
    /// Show message and chunk coverage
    Status {
        /// Chat to report on (all known chats when omitted)
        #[arg(long, allow_hyphen_values = true)]
        chat: Option<i64>,
    },
}

#[derive(Args)]
struct SummarizeArgs {
    #[arg(long, allow_hyphen_values = true)]
    chat: i64,

    /// First message id of the range
    #[arg(long, requires = "to", conflicts_with_all = ["since", "since_last"])]
    from: Option<i64>,

    /// Last message id of the range
    #[arg(long, requires = "from")]
    to: Option<i64>,

    /// Time window such as 30m, 1h, 2d
    #[arg(long, conflicts_with = "since_last")]
    since: Option<String>,

    /// Everything after the requester's latest message
    #[arg(long)]
    since_last: bool,

    /// Username the summary is written for
    #[arg(long, default_value = "user")]
    requester: String,
}

// ── Setup ──────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sunto=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> SuntoConfig {
    let mut config = SuntoConfig::from_env();
    let mut completion = config.completion.clone();
    if let Some(ref url) = cli.base_url {
        completion.base_url = url.clone();
    }
    if let Some(ref model) = cli.model {
        completion.model = model.clone();
    }
    config = config.with_completion(completion);
    if let Some(n) = cli.chunk_size {
        config = config.with_chunk_size(n);
    }
    if let Some(n) = cli.max_parallel {
        config = config.with_max_parallel(n);
    }
    if let Some(n) = cli.reduce_threshold {
        config = config.with_reduce_threshold(n);
    }
    if cli.recursive_reduce {
        config = config.with_reduction(ReductionPolicy::Recursive);
    }
    config
}

struct App {
    engine: SummaryEngine,
    log: Arc<JsonlMessageLog>,
}

fn open_app(cli: &Cli) -> Result<App, String> {
    let config = build_config(cli);
    let log = Arc::new(
        JsonlMessageLog::open_in(&cli.data_dir)
            .map_err(|e| format!("failed to open message log: {e}"))?,
    );
    let store = Arc::new(
        JsonlChunkStore::open_in(&cli.data_dir)
            .map_err(|e| format!("failed to open chunk store: {e}"))?,
    );
    let client: Arc<dyn CompletionService> =
        Arc::new(CompletionClient::new(config.completion.clone())?);
    let engine = SummaryEngine::new(config, log.clone(), store, client);
    Ok(App { engine, log })
}

fn chats_or_all(app: &App, chat: Option<i64>) -> Vec<i64> {
    match chat {
        Some(id) => vec![id],
        None => app.log.chat_ids(),
    }
}

// ── Commands ───────────────────────────────────────────────────────

async fn ingest(app: &App, file: &str, no_backfill: bool) -> Result<String, String> {
    let reader: Box<dyn BufRead> = if file == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let f = std::fs::File::open(file).map_err(|e| format!("failed to open '{file}': {e}"))?;
        Box::new(BufReader::new(f))
    };

    let (mut added, mut skipped, mut committed) = (0usize, 0usize, 0usize);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read '{file}': {e}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let message: ChatMessage = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping line {} of {file}: {e}", idx + 1);
                skipped += 1;
                continue;
            }
        };

        let result = if no_backfill {
            app.log.append(message).map(|()| None)
        } else {
            app.engine.ingest(message).await
        };
        match result {
            Ok(chunks) => {
                added += 1;
                committed += chunks.unwrap_or(0);
            }
            Err(StoreError::DuplicateMessage {
                chat_id,
                message_id,
            }) => {
                warn!("Message {message_id} of chat {chat_id} already stored");
                skipped += 1;
            }
            Err(e) => return Err(format!("failed to store message: {e}")),
        }
    }

    Ok(format!(
        "ingested {added} message(s), skipped {skipped}, committed {committed} chunk(s)\n"
    ))
}

async fn backfill(app: &App, chat: Option<i64>) -> Result<String, String> {
    let mut out = String::new();
    for chat_id in chats_or_all(app, chat) {
        let committed = app
            .engine
            .ensure_processed(chat_id)
            .await
            .map_err(|e| format!("backfill of chat {chat_id} failed: {e}"))?;
        out.push_str(&format!("chat {chat_id}: committed {committed} chunk(s)\n"));
    }
    Ok(out)
}

async fn summarize(app: &App, args: &SummarizeArgs) -> Result<String, String> {
    let text = match (args.from, args.to, &args.since) {
        (Some(from), Some(to), _) => {
            if from > to {
                return Err(format!("--from {from} is after --to {to}"));
            }
            let request = SummaryRequest::new(args.chat, from, to, &args.requester);
            app.engine.summarize_request(&request).await
        }
        (_, _, Some(since)) => {
            let interval = parse_interval(since)
                .ok_or_else(|| format!("invalid --since '{since}' (try 30m, 1h, 2d)"))?;
            app.engine
                .summarize_since(args.chat, interval, &args.requester)
                .await
        }
        _ if args.since_last => {
            app.engine
                .summarize_since_last_message(args.chat, &args.requester)
                .await
        }
        _ => return Err("provide --from/--to, --since, or --since-last".to_string()),
    };
    Ok(format!("{text}\n"))
}

fn sanitize(app: &App, chat: Option<i64>) -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(format!("{}\n", app.engine.sanitize(&buf, chat)))
}

fn status(app: &App, chat: Option<i64>) -> Result<String, String> {
    let mut out = String::new();
    for chat_id in chats_or_all(app, chat) {
        let s = app
            .engine
            .status(chat_id)
            .map_err(|e| format!("failed to read chat {chat_id}: {e}"))?;
        out.push_str(&format!(
            "chat {}: {} message(s), {} chunk(s), {} uncovered, cache {} hit(s) {} miss(es)\n",
            s.chat_id, s.messages, s.chunks, s.uncovered, s.cache_hits, s.cache_misses
        ));
    }
    if out.is_empty() {
        out.push_str("no chats stored\n");
    }
    Ok(out)
}

async fn run(cli: &Cli) -> Result<String, String> {
    let app = open_app(cli)?;
    match &cli.command {
        Command::Ingest { file, no_backfill } => ingest(&app, file, *no_backfill).await,
        Command::Backfill { chat } => backfill(&app, *chat).await,
        Command::Summarize(args) => summarize(&app, args).await,
        Command::Sanitize { chat } => sanitize(&app, *chat),
        Command::Status { chat } => status(&app, *chat),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
