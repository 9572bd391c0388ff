//! Splits a raw model reply into the spoken sentence and its quick-reply chips.

use serde::{Deserialize, Serialize};

/// Marker line the system instruction asks the model to put above its suggestions.
pub const SUGGESTION_MARKER: &str = "Варианты ответа:";

/// Bullets accepted in front of each suggestion (en dash, em dash).
const SUGGESTION_BULLETS: [char; 2] = ['–', '—'];

/// A model reply separated into the part that is spoken and the suggested answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub reply: String,
    pub suggestions: Vec<String>,
}

/// Parses raw model text. Never fails: a reply without the marker is returned
/// whole, trimmed, with no suggestions.
pub fn parse(raw: &str) -> ParsedResponse {
    let Some((reply, tail)) = raw.split_once(SUGGESTION_MARKER) else {
        return ParsedResponse {
            reply: raw.trim().to_string(),
            suggestions: Vec::new(),
        };
    };

    let suggestions = tail
        .split(SUGGESTION_BULLETS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    ParsedResponse {
        reply: reply.trim().to_string(),
        suggestions,
    }
}
