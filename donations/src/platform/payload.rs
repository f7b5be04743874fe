use crate::sanitize::{sanitize_amount, sanitize_text};
use serde_json::{Map, Value};

/// Read-only view over an untyped webhook object.
///
/// Field paths may address nested objects with dots (`etc.amount_to_display`).
#[derive(Clone, Copy)]
pub struct Payload<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Payload<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Payload { fields }
    }

    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// True when the field is present, even if its value is null.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn has_any(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.has(p))
    }

    /// Loose presence test: null, false, 0 and "" count as absent.
    pub fn is_truthy(&self, path: &str) -> bool {
        match self.get(path) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }

    pub fn str_eq(&self, path: &str, expected: &str) -> bool {
        self.get(path).and_then(Value::as_str) == Some(expected)
    }

    /// Case-insensitive substring test on a string field.
    pub fn contains(&self, path: &str, needle: &str) -> bool {
        self.get(path)
            .and_then(Value::as_str)
            .is_some_and(|s| s.to_lowercase().contains(needle))
    }

    /// Raw value of the first truthy alias. Later aliases are never
    /// consulted once one is set, even if it turns out unusable.
    fn first_set(&self, aliases: &[&str]) -> Option<&'a Value> {
        aliases
            .iter()
            .find(|alias| self.is_truthy(alias))
            .and_then(|alias| self.get(alias))
    }

    /// Sanitized text of the first set alias, or empty.
    pub fn first_text(&self, aliases: &[&str], max_length: usize) -> String {
        sanitize_text(self.first_set(aliases), max_length)
    }

    /// Sanitized amount of the first set alias, or 0.
    pub fn first_amount(&self, aliases: &[&str]) -> f64 {
        sanitize_amount(self.first_set(aliases))
    }

    /// Tri-state flag: `None` when absent, null or not boolean-like.
    pub fn first_flag(&self, aliases: &[&str]) -> Option<bool> {
        aliases.iter().find_map(|alias| match self.get(alias)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn first_count(&self, aliases: &[&str]) -> Option<u64> {
        aliases.iter().find_map(|alias| match self.get(alias)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn keys(&self) -> Vec<&'a str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_nested_paths() {
        let fields = object(json!({"etc": {"amount_to_display": 500}, "content": "x"}));
        let payload = Payload::new(&fields);
        assert_eq!(payload.get("etc.amount_to_display"), Some(&json!(500)));
        assert_eq!(payload.get("content.link"), None);
        assert_eq!(payload.get("missing.path"), None);
    }

    #[test]
    fn test_truthiness() {
        let fields = object(json!({
            "zero": 0, "empty": "", "null": null, "no": false,
            "yes": true, "n": 3, "s": "a", "arr": [], "obj": {}
        }));
        let payload = Payload::new(&fields);
        for key in ["zero", "empty", "null", "no", "missing"] {
            assert!(!payload.is_truthy(key), "{key} should be falsy");
        }
        for key in ["yes", "n", "s", "arr", "obj"] {
            assert!(payload.is_truthy(key), "{key} should be truthy");
        }
        assert!(payload.has("null"));
    }

    #[test]
    fn test_first_alias_wins() {
        let fields = object(json!({"a": "", "b": "Bob", "c": "Carol", "x": 0, "y": "700"}));
        let payload = Payload::new(&fields);
        assert_eq!(payload.first_text(&["a", "b", "c"], 100), "Bob");
        assert_eq!(payload.first_text(&["missing"], 100), "");
        assert_eq!(payload.first_amount(&["x", "y"]), 700.0);
        assert_eq!(payload.first_amount(&["missing"]), 0.0);
    }

    #[test]
    fn test_set_alias_is_not_skipped_when_unusable() {
        let fields = object(json!({
            "blank": "   ", "name": "Bob",
            "negative": -5, "word": "abc", "amount": 100
        }));
        let payload = Payload::new(&fields);
        assert_eq!(payload.first_text(&["blank", "name"], 100), "");
        assert_eq!(payload.first_amount(&["negative", "amount"]), 0.0);
        assert_eq!(payload.first_amount(&["word", "amount"]), 0.0);
    }

    #[test]
    fn test_flags_are_tri_state() {
        let fields = object(json!({"t": true, "f": "false", "n": null, "one": 1}));
        let payload = Payload::new(&fields);
        assert_eq!(payload.first_flag(&["t"]), Some(true));
        assert_eq!(payload.first_flag(&["f"]), Some(false));
        assert_eq!(payload.first_flag(&["n"]), None);
        assert_eq!(payload.first_flag(&["n", "one"]), Some(true));
        assert_eq!(payload.first_flag(&["missing"]), None);
    }
}
