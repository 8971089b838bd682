//! Prompts for the three kinds of completion call.
//!
//! - **Chunk**: one backfill task summarizes one fixed-size chunk.
//! - **Reduce**: one group of cached chunk summaries becomes a meta-summary.
//! - **Final**: the user-facing summary, either over raw messages (no cached
//!   content) or combining partial summaries with the raw tail.

use crate::chat::{ChatMessage, render_messages};

/// Shared citation rule. Integer hrefs become deep links in the sanitizer.
const CITATION_RULE: &str = "\
When you refer to a specific message, link to it by its id using \
<a href=\"ID\">text</a>, or <a href=\"ID1,ID2\">text</a> for several messages.";

/// System prompt for summarizing one chunk of raw messages.
pub const CHUNK_PROMPT: &str = "\
Summarize the following group chat messages concisely. Focus on:
- Topics discussed and who drove them
- Decisions, plans, and action items
- Questions that were asked and whether they were answered
- Links, files, and images that were shared

Rules:
- Only include facts explicitly stated in the messages. Do not infer or extrapolate.
- Keep names exactly as they appear.
- Each message line starts with [#ID timestamp]; keep the ids of important messages \
  so they can be cited later.
- Be concise. Every sentence must earn its place.";

/// System prompt for the one-level reduction of cached chunk summaries.
pub const REDUCE_PROMPT: &str = "\
You will receive consecutive partial summaries of one group chat, oldest first. \
Merge them into a single cohesive summary. Do not simply append: integrate, \
deduplicate, and keep the chronological thread. Preserve names and message ids \
that the partial summaries cite.";

/// Input for one chunk-summarization call.
pub fn chunk_input(messages: &[ChatMessage]) -> String {
    let mut content = String::from("=== MESSAGES ===\n");
    content.push_str(&render_messages(messages));
    content
}

/// Input for one reduction call: one group of partial summaries, oldest first.
pub fn reduce_input(group: &[String]) -> String {
    let mut content = String::new();
    for (i, partial) in group.iter().enumerate() {
        content.push_str(&format!(
            "=== PARTIAL SUMMARY {} ===\n{}\n\n",
            i + 1,
            partial.trim()
        ));
    }
    content.trim_end().to_string()
}

/// Who asked and for which period; prepended to the final system prompt.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub requester: &'a str,
    pub time_range: &'a str,
}

/// System prompt for the final call over raw messages only.
pub fn direct_system_prompt(persona: &str, ctx: &RequestContext<'_>) -> String {
    format!(
        "{persona}\n\n{CITATION_RULE}\n\nThe requesting user is: {}\nTime period: {}",
        ctx.requester, ctx.time_range
    )
}

/// Input for the final call over raw messages only.
pub fn direct_input(messages: &[ChatMessage], ctx: &RequestContext<'_>) -> String {
    let mut lines = vec![
        "Chat Summary Request".to_string(),
        format!("Requesting User: @{}", ctx.requester),
        format!("Time Period: {}", ctx.time_range),
        format!("Total Messages: {}", messages.len()),
        String::new(),
        "Messages:".to_string(),
    ];
    lines.extend(messages.iter().map(ChatMessage::render));
    lines.join("\n")
}

/// System prompt for the final call that combines partial summaries.
pub fn combine_system_prompt(persona: &str, ctx: &RequestContext<'_>) -> String {
    format!(
        "{persona}\n\n\
         You will receive partial summaries covering consecutive parts of the \
         requested period, oldest first, possibly followed by the most recent raw \
         messages that have not been summarized yet. Combine them into one summary \
         of the whole period.\n\n{CITATION_RULE}\n\n\
         The requesting user is: {}\nTime period: {}",
        ctx.requester, ctx.time_range
    )
}

/// Input for the final call: partial summaries in range order, then the
/// rendered raw tail.
pub fn combine_input(
    partials: &[String],
    tail: &[ChatMessage],
    ctx: &RequestContext<'_>,
) -> String {
    let mut content = format!(
        "Partial summaries to combine for {} (requested by @{}):\n\n",
        ctx.time_range, ctx.requester
    );
    for (i, partial) in partials.iter().enumerate() {
        content.push_str(&format!(
            "=== PARTIAL SUMMARY {} ===\n{}\n\n",
            i + 1,
            partial.trim()
        ));
    }
    if !tail.is_empty() {
        content.push_str(&format!(
            "=== RECENT MESSAGES ({}) ===\n{}\n",
            tail.len(),
            render_messages(tail)
        ));
    }
    content.trim_end().to_string()
}
