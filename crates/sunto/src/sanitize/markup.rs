//! Lightweight markup to tags, and tag-synonym normalization.
//!
//! Code spans, fenced blocks, existing `<pre>`/`<code>` elements, and link
//! targets are protected: markdown inside them is left alone.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Spans whose contents must not be touched by inline conversions.
static PROTECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)```(?:[A-Za-z0-9_+\-]*\n)?(?P<fence>.*?)```",
        r"|`(?P<inline>[^`\n]+)`",
        r"|(?P<html><(?i:pre|code)\b[^<>]*>.*?</(?i:pre|code)\s*>)",
        r"|\[(?P<ltext>[^\]\n]+)\]\((?P<lhref>[^()\s]+)\)",
        r"|(?P<atag><(?i:a)\b[^<>]*>)",
    ))
    .expect("valid regex")
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("valid regex")
});
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)[-*+][ \t]+").expect("valid regex"));
static BOLD_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_\n]+?)__").expect("valid regex"));
static STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~\n]+?)~~").expect("valid regex"));
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*([^\s*](?:[^*\n]*[^\s*])?)\*").expect("valid regex")
});
// Underscore italics only at word boundaries, so snake_case survives.
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^|[^\p{L}\p{N}_])_([^\s_](?:[^_\n]*[^\s_])?)_($|[^\p{L}\p{N}_])")
        .expect("valid regex")
});

static SYNONYM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?)(strong|em|ins|strike|del)\b([^<>]*)>").expect("valid regex")
});
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

/// Map a tag name to its canonical allowed form, if it has one.
pub(crate) fn canonical_tag(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "b" | "strong" => Some("b"),
        "i" | "em" => Some("i"),
        "u" | "ins" => Some("u"),
        "s" | "strike" | "del" => Some("s"),
        "code" => Some("code"),
        "pre" => Some("pre"),
        "a" => Some("a"),
        "blockquote" => Some("blockquote"),
        _ => None,
    }
}

/// Convert markdown-style markup to tags.
pub(crate) fn markdown_to_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PROTECTED.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&convert_inline(text.get(last..whole.start()).unwrap_or_default()));
        last = whole.end();

        if let Some(fence) = caps.name("fence") {
            out.push_str("<pre>");
            out.push_str(fence.as_str().trim_end_matches('\n'));
            out.push_str("</pre>");
        } else if let Some(code) = caps.name("inline") {
            out.push_str("<code>");
            out.push_str(code.as_str());
            out.push_str("</code>");
        } else if let (Some(label), Some(href)) = (caps.name("ltext"), caps.name("lhref")) {
            out.push_str(&format!(
                "<a href=\"{}\">{}</a>",
                href.as_str(),
                convert_inline(label.as_str())
            ));
        } else {
            // Existing <pre>/<code> element or <a ...> opening tag.
            out.push_str(whole.as_str());
        }
    }
    out.push_str(&convert_inline(text.get(last..).unwrap_or_default()));
    out
}

fn convert_inline(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = HEADING.replace_all(text, "<b>${1}</b>");
    let text = bullets(&text);
    let text = BOLD_STAR.replace_all(&text, "<b>${1}</b>");
    let text = BOLD_UNDERSCORE.replace_all(&text, "<b>${1}</b>");
    let text = STRIKE.replace_all(&text, "<s>${1}</s>");
    let text = ITALIC_STAR.replace_all(&text, "<i>${1}</i>");
    // Twice: each match consumes its trailing boundary character.
    let text = ITALIC_UNDERSCORE.replace_all(&text, "${1}<i>${2}</i>${3}");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "${1}<i>${2}</i>${3}");
    text.into_owned()
}

/// Replace `-`, `*`, and `+` list markers with bullets.
pub(crate) fn bullets(text: &str) -> String {
    BULLET.replace_all(text, "${1}• ").into_owned()
}

/// Rename synonym tags (`strong`, `em`, ...) and turn `<br>` into newlines.
pub(crate) fn normalize_synonyms(text: &str) -> String {
    let text = LINE_BREAK.replace_all(text, "\n");
    SYNONYM
        .replace_all(&text, |caps: &Captures<'_>| {
            let name = canonical_tag(&caps[2]).unwrap_or("b");
            format!("<{}{}{}>", &caps[1], name, &caps[3])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_italic_strike() {
        assert_eq!(
            markdown_to_tags("**Bold** and *it* and ~~gone~~ and __also__"),
            "<b>Bold</b> and <i>it</i> and <s>gone</s> and <b>also</b>"
        );
    }

    #[test]
    fn underscore_italics_respect_word_boundaries() {
        assert_eq!(markdown_to_tags("_hello_ world"), "<i>hello</i> world");
        assert_eq!(markdown_to_tags("_a_ _b_"), "<i>a</i> <i>b</i>");
        assert_eq!(markdown_to_tags("snake_case_name"), "snake_case_name");
    }

    #[test]
    fn code_is_protected() {
        assert_eq!(
            markdown_to_tags("run `make *all*` now"),
            "run <code>make *all*</code> now"
        );
        assert_eq!(
            markdown_to_tags("```rust\nlet x = *y;\n```"),
            "<pre>let x = *y;</pre>"
        );
        assert_eq!(
            markdown_to_tags("<pre>a **b**</pre> **c**"),
            "<pre>a **b**</pre> <b>c</b>"
        );
    }

    #[test]
    fn links_and_headings_and_bullets() {
        assert_eq!(
            markdown_to_tags("[the docs](https://example.com/a_b_)"),
            "<a href=\"https://example.com/a_b_\">the docs</a>"
        );
        assert_eq!(
            markdown_to_tags("# Title\n- one\n* two"),
            "<b>Title</b>\n• one\n• two"
        );
    }

    #[test]
    fn plain_text_is_untouched() {
        let text = "5 * 3 = 15, see you at 9";
        assert_eq!(markdown_to_tags(text), text);
    }

    #[test]
    fn synonyms_and_line_breaks() {
        assert_eq!(
            normalize_synonyms("<strong>a</strong><EM>b</EM><del>c</del>1<br>2<br />3"),
            "<b>a</b><i>b</i><s>c</s>1\n2\n3"
        );
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_tag("STRONG"), Some("b"));
        assert_eq!(canonical_tag("blockquote"), Some("blockquote"));
        assert_eq!(canonical_tag("script"), None);
    }
}
