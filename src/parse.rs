//! Extraction of structured fields from the model's final answer.
//!
//! The system prompt asks for a `**CONFIDENCE:** NN%` line and a numbered
//! `**SUGGESTED ACTIONS:**` list. Models follow that loosely, so both
//! parsers are lenient about bold markers and case, and both fall back to a
//! fixed value instead of failing.

use regex::Regex;
use std::sync::OnceLock;

/// Returned when no numbered actions can be found.
pub const DEFAULT_ACTION: &str = "Investigate further";

fn confidence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\*{0,2}CONFIDENCE\*{0,2}[:\s*]+(\d+)").expect("valid confidence regex")
    })
}

fn actions_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\*{0,2}SUGGESTED ACTIONS\*{0,2}[:\s]+").expect("valid actions regex")
    })
}

/// A following section label such as `**NOTES:**` or `RISKS:`.
fn section_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*\*{0,2}[A-Za-z][A-Za-z ]{2,}\*{0,2}:").expect("valid label regex")
    })
}

fn numbered_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s+(.+)$").expect("valid item regex"))
}

/// Confidence as a fraction in `[0.0, 1.0]`.
///
/// Takes the first `CONFIDENCE` marker followed by an integer, clamps the
/// value to 100 and divides by 100. Missing marker gives `0.0`.
pub fn parse_confidence(text: &str) -> f64 {
    confidence_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|value| value.min(100.0) / 100.0)
        .unwrap_or(0.0)
}

/// Numbered items under the `SUGGESTED ACTIONS` header, in order.
///
/// The section ends at the next labelled section or at the end of the text.
/// Never empty: falls back to `["Investigate further"]`.
pub fn parse_actions(text: &str) -> Vec<String> {
    let Some(header) = actions_header_re().find(text) else {
        return vec![DEFAULT_ACTION.to_string()];
    };

    let rest = &text[header.end()..];
    let section = match section_label_re().find(rest) {
        Some(label) => &rest[..label.start()],
        None => rest,
    };

    let actions: Vec<String> = numbered_item_re()
        .captures_iter(section)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    if actions.is_empty() {
        vec![DEFAULT_ACTION.to_string()]
    } else {
        actions
    }
}
