//! Best-effort structured output extraction.
//!
//! Every call site that expects JSON from a model goes through
//! [`extract_json`]: parse the whole text, else the first fenced block, else
//! the outermost `{...}` or `[...]` span. Validation is the target type's
//! `Deserialize` impl; anything that does not fit yields `None` and the caller
//! uses its documented fallback.
//!
//! Models often send `null` for fields they have nothing to say about, and
//! sometimes one malformed element in an otherwise good list. Reply types use
//! [`null_as_default`] and [`lenient_list`] so those cases degrade per field
//! instead of failing the whole reply.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok())
        .as_ref()
}

/// Extract and deserialize the first JSON value of type `T` from model text.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(caps) = fence_pattern().and_then(|re| re.captures(trimmed)) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Some(value);
        }
    }

    let object = span(trimmed, '{', '}');
    let array = span(trimmed, '[', ']');
    let mut spans: Vec<(usize, &str)> = object.into_iter().chain(array).collect();
    spans.sort_by_key(|(start, _)| *start);

    spans
        .into_iter()
        .find_map(|(_, candidate)| serde_json::from_str(candidate).ok())
}

/// Read `null` the same as a missing field.
///
/// Use with `#[serde(default, deserialize_with = "null_as_default")]`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read a list, keeping only the elements that deserialize as `T`.
///
/// `null` or a non-array value reads as an empty list.
pub fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if kept.len() < total {
        debug!("Dropped {} malformed list elements", total - kept.len());
    }
    Ok(kept)
}

fn span(text: &str, open: char, close: char) -> Option<(usize, &str)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| (start, &text[start..=end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shape {
        score: u32,
    }

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json::<Shape>(r#"{"score": 7}"#), Some(Shape { score: 7 }));
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here you go:\n```json\n{\"score\": 42}\n```\nAnything else?";
        assert_eq!(extract_json::<Shape>(text), Some(Shape { score: 42 }));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = "Sure! The result is {\"score\": 3} as requested.";
        assert_eq!(extract_json::<Shape>(text), Some(Shape { score: 3 }));
    }

    #[test]
    fn test_array_payload() {
        let text = "Subtasks: [\"a\", \"b\"]";
        assert_eq!(
            extract_json::<Vec<String>>(text),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        #[serde(default, deserialize_with = "null_as_default")]
        notes: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        done: bool,
        #[serde(default, deserialize_with = "lenient_list")]
        items: Vec<Shape>,
    }

    #[test]
    fn test_null_fields_read_as_default() {
        let reply: Reply =
            extract_json(r#"{"notes": null, "done": null, "items": null}"#).unwrap();
        assert!(reply.notes.is_empty());
        assert!(!reply.done);
        assert!(reply.items.is_empty());
    }

    #[test]
    fn test_malformed_list_elements_are_dropped() {
        let reply: Reply = extract_json(
            r#"{"notes": ["ok"], "items": [{"score": 1}, {"score": "high"}, null, {"score": 3}]}"#,
        )
        .unwrap();
        assert_eq!(reply.notes, vec!["ok".to_string()]);
        assert_eq!(reply.items, vec![Shape { score: 1 }, Shape { score: 3 }]);
    }

    #[test]
    fn test_schema_mismatch_is_none() {
        assert_eq!(extract_json::<Shape>(r#"{"other": true}"#), None);
        assert_eq!(extract_json::<Shape>("no json here"), None);
        assert_eq!(extract_json::<Shape>(""), None);
    }
}
