//! Output sanitizer for the destination's tag-based markup.
//!
//! The destination renderer rejects a whole message on a single malformed
//! tag, so every summary passes through [`OutputSanitizer`] before it
//! leaves the engine. One pass runs, in order:
//!
//! 1. markdown-style markup to tags ([`markup`]),
//! 2. tag synonyms to canonical names, `<br>` to newlines,
//! 3. link validation and message-reference rewriting ([`links`]),
//! 4. entity decoding, before any tag matching,
//! 5. stack-based balancing over the allowed tag set ([`tags`]),
//! 6. newline collapsing and trimming.
//!
//! Passes repeat until the output stops changing, which makes the
//! sanitizer idempotent. If it does not settle within the pass budget the
//! output degrades to tag-free escaped text. The sanitizer never fails.

pub mod links;
pub mod markup;
pub mod tags;

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Tags that may appear in sanitized output.
pub const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "s", "code", "pre", "a", "blockquote"];

/// Passes before giving up on convergence.
const DEFAULT_MAX_PASSES: usize = 4;

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

/// Cleans completion output into well-formed destination markup.
#[derive(Debug, Clone)]
pub struct OutputSanitizer {
    max_passes: usize,
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl OutputSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `text`. `chat_id` resolves integer message references into
    /// deep links; without it they are reduced to their link text.
    pub fn sanitize(&self, text: &str, chat_id: Option<i64>) -> String {
        let mut current = sanitize_once(text, chat_id);
        for _ in 1..self.max_passes {
            let next = sanitize_once(&current, chat_id);
            if next == current {
                return current;
            }
            current = next;
        }
        warn!(
            "Sanitizer did not settle after {} passes, degrading to plain text",
            self.max_passes
        );
        plain_text(&current)
    }
}

fn sanitize_once(text: &str, chat_id: Option<i64>) -> String {
    let text = text.replace("\r\n", "\n");
    let text = markup::markdown_to_tags(&text);
    let text = markup::normalize_synonyms(&text);
    let text = links::rewrite_links(&text, chat_id);
    let text = tags::decode_entities(&text);
    let text = tags::balance(tags::tokenize(&text));
    collapse_newlines(&text)
}

fn collapse_newlines(text: &str) -> String {
    BLANK_RUNS.replace_all(text, "\n\n").trim().to_string()
}

/// Tag-free fallback: text runs only, markup characters removed, escaped.
fn plain_text(text: &str) -> String {
    let decoded = tags::decode_entities(&tags::text_only(tags::tokenize(text)));
    let stripped: String = decoded
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '*' | '_' | '~' | '`' | '#' | '[' | ']'))
        .collect();
    collapse_newlines(&tags::escape_text(&markup::bullets(&stripped)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: i64 = -1001234567890;

    fn sanitize(text: &str) -> String {
        OutputSanitizer::new().sanitize(text, Some(CHAT))
    }

    /// Every tag allowed, every opening matched, properly nested.
    fn assert_well_formed(output: &str) {
        let mut stack = Vec::new();
        for token in tags::tokenize(output) {
            match token {
                tags::Token::Open { name, .. } => {
                    assert!(ALLOWED_TAGS.contains(&name.as_str()), "tag {name} in {output:?}");
                    stack.push(name);
                }
                tags::Token::Close { name } => {
                    assert_eq!(stack.pop().as_deref(), Some(name.as_str()), "in {output:?}");
                }
                tags::Token::Text(_) => {}
            }
        }
        assert!(stack.is_empty(), "unclosed {stack:?} in {output:?}");
    }

    const NASTY: &[&str] = &[
        "<b>Bold <i>italic</b> wrong",
        "<b>Bold <i>italic</b> wrong nesting</i>",
        "<b><i>Nested</b></i>",
        "Text</b> with orphaned closing",
        "<b>Unclosed bold",
        "<script>alert('xss')</script>",
        "&lt;script&gt;alert(1)&lt;/script&gt;",
        "&lt;a href=\"javascript:x\"&gt;hi&lt;/a&gt;",
        "**bold *mixed** italic*",
        "<a href=\"https://x.y\">outer <a href=\"1\">inner</a></a>",
        "<pre><b>code</pre></b>",
        "a <<b>> c < d > e",
        "```\nunterminated fence",
        "<a href=\"5,9\">see</a> and <a href=\"7\"></a>",
        "Emoji 🚀 with <b>bold</b> text",
        "A &amp; B &amp;lt; C",
        "_a_ __b__ ~~c~~ `d`",
    ];

    #[test]
    fn output_is_always_well_formed() {
        for input in NASTY {
            assert_well_formed(&sanitize(input));
            assert_well_formed(&OutputSanitizer::new().sanitize(input, None));
        }
    }

    #[test]
    fn sanitizing_twice_is_a_no_op() {
        for input in NASTY {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn improper_nesting_is_repaired_by_dropping() {
        assert_eq!(sanitize("<b>Bold <i>italic</b> wrong"), "<b>Bold italic</b> wrong");
    }

    #[test]
    fn message_references_become_deep_links() {
        assert_eq!(
            sanitize(r#"<a href="5,9">see</a>"#),
            "<a href=\"https://t.me/c/1234567890/5\">see</a>, \
             <a href=\"https://t.me/c/1234567890/9\">2</a>"
        );
    }

    #[test]
    fn basic_cases() {
        assert_eq!(sanitize("Hello world"), "Hello world");
        assert_eq!(sanitize("<strong>Bold</strong>"), "<b>Bold</b>");
        assert_eq!(sanitize("Line 1<br>Line 2"), "Line 1\nLine 2");
        assert_eq!(sanitize("A &amp; B"), "A &amp; B");
        assert_eq!(sanitize("<div>Not allowed</div>"), "Not allowed");
        assert_eq!(
            sanitize(r#"<a href="javascript:alert()">Bad link</a>"#),
            "Bad link"
        );
        assert_eq!(
            sanitize("Emoji 🚀 with <b>bold</b> text"),
            "Emoji 🚀 with <b>bold</b> text"
        );
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn encoded_tags_are_validated_like_real_ones() {
        assert_eq!(sanitize("&lt;script&gt;alert(1)&lt;/script&gt;"), "alert(1)");
        assert_eq!(sanitize("&lt;a href=\"javascript:x\"&gt;hi&lt;/a&gt;"), "hi");
    }

    #[test]
    fn markdown_summary() {
        let input = "## Highlights\n\n\n\n- **Deploy** moved to *Friday*\n- see [thread](https://example.com)";
        assert_eq!(
            sanitize(input),
            "<b>Highlights</b>\n\n• <b>Deploy</b> moved to <i>Friday</i>\n\
             • see <a href=\"https://example.com\">thread</a>"
        );
    }

    #[test]
    fn plain_text_fallback_has_no_markup() {
        let out = plain_text("<b>x</b> **y** &lt;i&gt;");
        assert_eq!(out, "x y i");
    }
}
