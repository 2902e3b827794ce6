//! JSON object extraction from raw LLM text.
//!
//! Models answer with bare JSON, JSON inside a fenced code block, or JSON
//! surrounded by prose. Strategies are tried in that order and the first
//! top-level object that parses wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

const PREVIEW_CHARS: usize = 200;

static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").expect("CODE_BLOCK_RE regex should compile")
});

/// Extract the first well-formed top-level JSON object from `raw`.
pub fn extract_json_object(raw: &str) -> ParseResult<Map<String, Value>> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(obj) = parse_object(text) {
        return Ok(obj);
    }

    if let Some(caps) = CODE_BLOCK_RE.captures(text) {
        if let Some(obj) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Ok(obj);
        }
    }

    // Widest span first, then every balanced candidate left to right.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(obj) = parse_object(&text[start..=end]) {
                return Ok(obj);
            }
        }
    }
    if let Some(obj) = scan_balanced(text) {
        return Ok(obj);
    }

    Err(ParseError::NoJsonObject {
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })
}

/// Fail with every missing key listed, in the order given.
pub fn require_fields(obj: &Map<String, Value>, fields: &[&str]) -> ParseResult<()> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|f| !obj.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::MissingFields(missing))
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Walk the text tracking brace depth outside string literals and try each
/// balanced `{...}` span in order.
fn scan_balanced(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        if let Some(end) = end {
            if let Some(obj) = parse_object(&text[start..=end]) {
                return Some(obj);
            }
        }
        search_from = start + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_json() {
        let obj = extract_json_object(r#"{"continue_propagation": true}"#).unwrap();
        assert_eq!(obj["continue_propagation"], Value::Bool(true));
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        let obj = extract_json_object(raw).unwrap();
        assert_eq!(obj["a"], 1);
    }

    #[test]
    fn test_fence_without_language() {
        let raw = "```\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_json_object(raw).unwrap()["a"][1], 2);
    }

    #[test]
    fn test_surrounding_prose() {
        let raw = "My verdict is {\"x\": {\"y\": 2}} as requested.";
        assert_eq!(extract_json_object(raw).unwrap()["x"]["y"], 2);
    }

    #[test]
    fn test_two_objects_in_prose_takes_first() {
        let raw = "first {\"a\": 1} then {\"b\": 2}";
        let obj = extract_json_object(raw).unwrap();
        assert_eq!(obj["a"], 1);
        assert!(!obj.contains_key("b"));
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = "note {\"text\": \"a } b {\", \"n\": 3} end";
        assert_eq!(extract_json_object(raw).unwrap()["n"], 3);
    }

    #[test]
    fn test_unclosed_prefix_brace() {
        let raw = "oops { here is {\"ok\": true}";
        assert_eq!(extract_json_object(raw).unwrap()["ok"], true);
    }

    #[test]
    fn test_rejects_arrays_and_garbage() {
        assert!(matches!(extract_json_object("[1,2]"), Err(ParseError::NoJsonObject { .. })));
        assert!(matches!(extract_json_object("no json"), Err(ParseError::NoJsonObject { .. })));
        assert_eq!(extract_json_object("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_require_fields() {
        let obj = extract_json_object(r#"{"topology": {}}"#).unwrap();
        assert!(require_fields(&obj, &["topology"]).is_ok());
        let err = require_fields(&obj, &["topology", "seed_ripple", "x"]).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingFields(vec!["seed_ripple".into(), "x".into()])
        );
    }
}
