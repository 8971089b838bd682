//! Entity decoding, tag tokenizing, and stack-based tag balancing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::links::{extract_href, is_allowed_href};
use super::markup::canonical_tag;

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|amp|lt|gt|quot|apos|nbsp);")
        .expect("valid regex")
});

/// Decode named and numeric entities in a single pass.
///
/// `&amp;lt;` decodes to `&lt;`, not `<`.
pub(crate) fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

pub(crate) fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Text(String),
    Open { name: String, attrs: String },
    Close { name: String },
}

/// Split text into tags and text runs.
///
/// A tag is `<`, an optional `/`, an ASCII letter, then anything up to the
/// next `>` that contains no `<`. Every other `<` is text.
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(pos) = rest.find('<') {
        let (before, from_lt) = rest.split_at(pos);
        text.push_str(before);
        match parse_tag(from_lt) {
            Some((token, consumed)) => {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(token);
                rest = from_lt.get(consumed..).unwrap_or_default();
            }
            None => {
                text.push('<');
                rest = from_lt.get(1..).unwrap_or_default();
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

/// Parse a tag at the start of `s` (which begins with `<`). Returns the
/// token and the number of bytes it spans.
fn parse_tag(s: &str) -> Option<(Token, usize)> {
    let after_lt = s.strip_prefix('<')?;
    let (closing, body) = match after_lt.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, after_lt),
    };
    if !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let end = body.find(['<', '>'])?;
    let inner = body.get(..end)?;
    if !body.get(end..)?.starts_with('>') {
        return None;
    }

    let name_len = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    let name = inner.get(..name_len)?.to_ascii_lowercase();
    let consumed = s.len() - body.len() + end + 1;

    let token = if closing {
        Token::Close { name }
    } else {
        let attrs = inner.get(name_len..)?.trim().trim_end_matches('/').trim_end();
        Token::Open {
            name,
            attrs: attrs.to_string(),
        }
    };
    Some((token, consumed))
}

enum Piece {
    Text(String),
    Open {
        name: &'static str,
        href: Option<String>,
    },
    Close(&'static str),
}

/// Keep only allowed, properly paired tags and escape all text.
///
/// Openings wait on a stack until their closing tag arrives. A closing tag
/// pairs with the nearest matching opening; any openings above it are
/// dropped. Orphan closings and openings still pending at the end are
/// dropped. The result is always properly nested. Links never nest: an `a`
/// opening while another `a` is open is dropped.
pub(crate) fn balance(tokens: Vec<Token>) -> String {
    // (piece, kept)
    let mut pieces: Vec<(Piece, bool)> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<(&'static str, usize)> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => pieces.push((Piece::Text(text), true)),
            Token::Open { name, .. } if name == "br" => {
                pieces.push((Piece::Text("\n".to_string()), true));
            }
            Token::Open { name, attrs } => {
                let Some(tag) = canonical_tag(&name) else {
                    continue;
                };
                if tag == "a" && stack.iter().any(|(open, _)| *open == "a") {
                    continue;
                }
                let href = if tag == "a" {
                    match extract_href(&attrs).filter(|h| is_allowed_href(h)) {
                        Some(href) => Some(href),
                        None => continue,
                    }
                } else {
                    None
                };
                stack.push((tag, pieces.len()));
                pieces.push((Piece::Open { name: tag, href }, false));
            }
            Token::Close { name } => {
                let Some(tag) = canonical_tag(&name) else {
                    continue;
                };
                let Some(pos) = stack.iter().rposition(|(open, _)| *open == tag) else {
                    continue;
                };
                if let Some(&(_, open_idx)) = stack.get(pos)
                    && let Some(open) = pieces.get_mut(open_idx)
                {
                    open.1 = true;
                }
                stack.truncate(pos);
                pieces.push((Piece::Close(tag), true));
            }
        }
    }

    let mut out = String::new();
    for (piece, kept) in pieces {
        if !kept {
            continue;
        }
        match piece {
            Piece::Text(text) => out.push_str(&escape_text(&text)),
            Piece::Open {
                name,
                href: Some(href),
            } => out.push_str(&format!("<{name} href=\"{}\">", escape_attr(&href))),
            Piece::Open { name, href: None } => out.push_str(&format!("<{name}>")),
            Piece::Close(name) => out.push_str(&format!("</{name}>")),
        }
    }
    out
}

/// All text runs of `tokens`, with `<br>` as a newline. Tags vanish.
pub(crate) fn text_only(tokens: Vec<Token>) -> String {
    tokens
        .into_iter()
        .filter_map(|token| match token {
            Token::Text(text) => Some(text),
            Token::Open { name, .. } if name == "br" => Some("\n".to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> String {
        balance(tokenize(input))
    }

    #[test]
    fn entities_decode_once() {
        assert_eq!(decode_entities("A &amp; B"), "A & B");
        assert_eq!(decode_entities("&lt;b&gt;"), "<b>");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&#128640; &#x41;"), "🚀 A");
        assert_eq!(decode_entities("&bogus; &#xFFFFFF;"), "&bogus; &#xFFFFFF;");
    }

    #[test]
    fn tokenizer_only_treats_letter_tags_as_tags() {
        assert_eq!(
            tokenize("a < b <3 <b>x</b>"),
            vec![
                Token::Text("a < b <3 ".into()),
                Token::Open {
                    name: "b".into(),
                    attrs: String::new()
                },
                Token::Text("x".into()),
                Token::Close { name: "b".into() },
            ]
        );
        assert_eq!(tokenize("<b unclosed"), vec![Token::Text("<b unclosed".into())]);
    }

    #[test]
    fn crossing_pair_drops_inner_opening() {
        assert_eq!(run("<b>Bold <i>italic</b> wrong"), "<b>Bold italic</b> wrong");
        assert_eq!(run("<b><i>Nested</b></i>"), "<b>Nested</b>");
    }

    #[test]
    fn nested_link_is_flattened() {
        assert_eq!(
            run(r#"<a href="https://a.b">x <a href="https://c.d">y</a></a>"#),
            "<a href=\"https://a.b\">x y</a>"
        );
    }

    #[test]
    fn orphans_and_unclosed_are_dropped() {
        assert_eq!(run("Text</b> with orphaned closing"), "Text with orphaned closing");
        assert_eq!(run("<b>Unclosed bold"), "Unclosed bold");
        assert_eq!(
            run("<b>Text with <i>nested</i> and unclosed"),
            "Text with <i>nested</i> and unclosed"
        );
    }

    #[test]
    fn disallowed_tags_are_removed_and_attributes_stripped() {
        assert_eq!(run("<script>alert('xss')</script>"), "alert('xss')");
        assert_eq!(run("<div>Not allowed</div>"), "Not allowed");
        assert_eq!(run(r#"<b class="test">Bold</b>"#), "<b>Bold</b>");
        assert_eq!(run("1<br/>2"), "1\n2");
    }

    #[test]
    fn anchors_need_a_valid_href() {
        assert_eq!(
            run(r#"<a href="https://example.com/?a=1&b=2">x</a>"#),
            r#"<a href="https://example.com/?a=1&amp;b=2">x</a>"#
        );
        assert_eq!(run(r#"<a href="javascript:x">hi</a>"#), "hi");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(run("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn text_only_strips_every_tag() {
        assert_eq!(text_only(tokenize("<b>a</b><br>b<x>")), "a\nb");
    }
}
