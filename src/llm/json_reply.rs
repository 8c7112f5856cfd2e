//! Clean up JSON replies from models.
//!
//! Even in JSON mode, OCR models like to wrap their answer in a Markdown code
//! fence, or to add a sentence of prose before it.

use crate::prelude::*;

/// Strip Markdown fences and surrounding prose from `reply`, and parse what
/// remains as JSON.
pub fn parse_json_reply(reply: &str) -> Result<Value> {
    let candidate = extract_json_text(reply);
    serde_json::from_str(candidate).with_context(|| {
        format!("model reply is not valid JSON: {:?}", truncate(reply, 200))
    })
}

/// Find the most likely JSON text inside `reply`.
fn extract_json_text(reply: &str) -> &str {
    let mut text = reply.trim();

    // A fenced block, with or without a language tag.
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        text = match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        };
    }

    // The outermost object or array.
    let open = text.find(['{', '[']);
    let close = text.rfind(['}', ']']);
    match (open, close) {
        (Some(open), Some(close)) if open < close => &text[open..=close],
        _ => text,
    }
}

/// Shorten `s` for error messages, respecting character boundaries.
fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_owned(),
    }
}
