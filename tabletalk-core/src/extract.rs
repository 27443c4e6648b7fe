//! Recover a JSON object from free-form planner output.
//!
//! Planners wrap their JSON in code fences, prose, or nothing at all. This
//! module is pure and total: it never errors and never touches I/O. Callers
//! must treat "no plan" the same as "unsure intent".

use regex::Regex;
use serde_json::{Map, Value};

/// Extract the first JSON object from arbitrary surrounding text.
///
/// Priority order: a fenced block labeled `json`, then any fenced block, then
/// the greedy first-`{`-to-last-`}` span, then the raw text itself. Returns
/// `None` whenever the selected span does not parse to a JSON object.
pub fn extract_json_payload(text: &str) -> Option<Map<String, Value>> {
    let raw = text.trim();

    let fenced_json = Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").unwrap();
    let fenced_any = Regex::new(r"(?is)```\s*(\{.*?\})\s*```").unwrap();
    let brace_span = Regex::new(r"(?s)\{.*\}").unwrap();

    let candidate = if let Some(m) = fenced_json.captures(raw).and_then(|c| c.get(1)) {
        m.as_str()
    } else if let Some(m) = fenced_any.captures(raw).and_then(|c| c.get(1)) {
        m.as_str()
    } else if let Some(m) = brace_span.find(raw) {
        m.as_str()
    } else {
        raw
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_json_fence() {
        let text = "Here\n```json\n{\"a\":1}\n```\nthanks";
        let out = extract_json_payload(text).unwrap();
        assert_eq!(out.get("a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_extracts_from_unlabeled_fence() {
        let text = "```\n{\"intent\":\"read\"}\n```";
        let out = extract_json_payload(text).unwrap();
        assert_eq!(out.get("intent"), Some(&serde_json::json!("read")));
    }

    #[test]
    fn test_extracts_from_plain_object_in_noise() {
        let text = "random {\"b\":2} tail";
        let out = extract_json_payload(text).unwrap();
        assert_eq!(out.get("b"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_bare_object_parses() {
        let out = extract_json_payload("  {\"x\": true}  ").unwrap();
        assert_eq!(out.get("x"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_no_object_yields_none() {
        assert!(extract_json_payload("I cannot help with that.").is_none());
    }

    #[test]
    fn test_non_object_json_yields_none() {
        assert!(extract_json_payload("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_unparseable_span_yields_none() {
        assert!(extract_json_payload("{not json at all}").is_none());
    }

    #[test]
    fn test_labeled_fence_wins_over_plain_fence() {
        let text = "```\n{\"plain\":1}\n```\n```json\n{\"labeled\":2}\n```";
        let out = extract_json_payload(text).unwrap();
        assert!(out.contains_key("labeled"));
    }
}
