//! Normalization of raw webhook scalars into bounded values.
//!
//! Nothing in here fails: malformed input degrades to an empty string or a
//! zero amount, and the admission pipeline rejects zero amounts later.

use serde_json::Value;

pub const DEFAULT_TEXT_LIMIT: usize = 100;
pub const MESSAGE_LIMIT: usize = 500;
pub const MAX_AMOUNT: f64 = 1_000_000_000.0;

/// Trims and truncates a raw field to at most `max_length` characters.
///
/// Strings are used as-is, numbers and booleans are rendered, everything
/// else (missing, null, objects, arrays) becomes the empty string.
pub fn sanitize_text(value: Option<&Value>, max_length: usize) -> String {
    let raw = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => return String::new(),
    };

    if raw.chars().count() <= max_length {
        return raw;
    }
    // Truncation can expose trailing whitespace from the middle of the text.
    raw.chars()
        .take(max_length)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Parses a decimal amount. Unparsable, non-finite or negative input yields
/// 0; values above [`MAX_AMOUNT`] are capped.
pub fn sanitize_amount(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(amount) if amount.is_finite() && amount > 0.0 => amount.min(MAX_AMOUNT),
        _ => 0.0,
    }
}
