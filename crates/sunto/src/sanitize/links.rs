//! Link validation and message-reference rewriting.
//!
//! Completion output cites messages with integer link targets
//! (`<a href="42">`, `<a href="5,9">`). With a chat context each id becomes
//! a deep link into that chat; anything else must use an allowed scheme or
//! the anchor is dropped and only its text kept.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// URI schemes a link may use.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https", "tg", "mailto"];

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^<>]*)>(.*?)</a\s*>").expect("valid regex"));
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("valid regex")
});
static ID_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+(?:\s*,\s*\d+)*\s*$").expect("valid regex"));

/// The `href` value of a tag's attribute string.
pub(crate) fn extract_href(attrs: &str) -> Option<String> {
    let caps = HREF.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}

/// Whether `href` uses one of [`ALLOWED_SCHEMES`].
pub fn is_allowed_href(href: &str) -> bool {
    let Some((scheme, rest)) = href.trim().split_once(':') else {
        return false;
    };
    !rest.is_empty() && ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
}

/// Deep link to a message.
///
/// Supergroup ids carry a `-100` prefix that the public link form omits.
pub fn message_link(chat_id: i64, message_id: i64) -> String {
    let raw = chat_id.to_string();
    let internal = raw
        .strip_prefix("-100")
        .map(str::to_string)
        .unwrap_or_else(|| chat_id.unsigned_abs().to_string());
    format!("https://t.me/c/{internal}/{message_id}")
}

/// Rewrite every paired anchor: resolve message references, keep allowed
/// links, and reduce everything else to its text.
pub(crate) fn rewrite_links(text: &str, chat_id: Option<i64>) -> String {
    ANCHOR
        .replace_all(text, |caps: &Captures<'_>| {
            let label = &caps[2];
            let Some(href) = extract_href(&caps[1]) else {
                return label.to_string();
            };

            if ID_LIST.is_match(&href) {
                return match chat_id {
                    Some(chat_id) => reference_links(chat_id, &href, label),
                    None => label.to_string(),
                };
            }

            if is_allowed_href(&href) {
                format!("<a href=\"{}\">{label}</a>", href.replace('"', "%22"))
            } else {
                label.to_string()
            }
        })
        .into_owned()
}

/// `"5,9"` with label `see` becomes two links labelled `see` and `2`.
/// An id that does not fit in an `i64` leaves only the label.
fn reference_links(chat_id: i64, ids: &str, label: &str) -> String {
    let Ok(ids) = ids
        .split(',')
        .map(|id| id.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
    else {
        return label.to_string();
    };
    ids.into_iter()
        .enumerate()
        .map(|(i, message_id)| {
            let text = if i == 0 && !label.trim().is_empty() {
                label.to_string()
            } else {
                (i + 1).to_string()
            };
            format!("<a href=\"{}\">{text}</a>", message_link(chat_id, message_id))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
