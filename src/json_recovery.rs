//! Lenient JSON recovery for generation service output
//!
//! Responses are supposed to be a single JSON object but arrive wrapped in
//! fenced blocks, surrounded by prose, or cut off mid-string. This module
//! extracts and syntactically patches them. It never validates schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker stored in [`RawTextFallback::error`] when nothing could be decoded.
pub const DECODE_FAILURE: &str = "response was not a decodable JSON object";

/// Raw text kept when every decode attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTextFallback {
    pub raw_analysis: String,
    pub error: String,
}

/// Outcome of [`parse_lenient`].
#[derive(Debug, Clone, PartialEq)]
pub enum LenientParse {
    Parsed(Map<String, Value>),
    Fallback(RawTextFallback),
}

impl LenientParse {
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            LenientParse::Parsed(map) => Some(map),
            LenientParse::Fallback(_) => None,
        }
    }

    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            LenientParse::Parsed(map) => Some(map),
            LenientParse::Fallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, LenientParse::Fallback(_))
    }
}

/// Slice spanning the first balanced top-level `{...}` in `text`.
///
/// Braces inside string literals (including escaped quotes) do not count.
/// Returns `""` when there is no `{`, and the unbalanced tail from the
/// opening brace when the text ends before the object closes.
pub fn extract_first_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return "";
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..start + offset + 1];
                }
            }
            _ => {}
        }
    }
    &text[start..]
}

/// Best-effort syntactic patch for truncated output.
///
/// Strips one trailing comma, closes an odd unescaped quote, then appends a
/// `]` for every unmatched `[` followed by a `}` for every unmatched `{`.
/// Brackets inside string literals are not counted. The result is not
/// guaranteed to decode.
pub fn repair(text: &str) -> String {
    let mut fixed = text.trim().to_string();
    if fixed.ends_with(',') {
        fixed.pop();
    }

    let mut quotes = 0usize;
    let mut open_brackets = 0usize;
    let mut open_braces = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for ch in fixed.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => {
                quotes += 1;
                in_string = !in_string;
            }
            '[' if !in_string => open_brackets += 1,
            ']' if !in_string => open_brackets = open_brackets.saturating_sub(1),
            '{' if !in_string => open_braces += 1,
            '}' if !in_string => open_braces = open_braces.saturating_sub(1),
            _ => {}
        }
    }

    if quotes % 2 != 0 {
        fixed.push('"');
    }
    fixed.extend(std::iter::repeat(']').take(open_brackets));
    fixed.extend(std::iter::repeat('}').take(open_braces));
    fixed
}

fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Body of the first fenced code block (```json or bare ```). A block whose
/// closing fence was cut off runs to the end of the text.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map_or(after.len(), |nl| nl + 1);
    let info = after[..body_start].trim();
    let body = if info.is_empty() || info.eq_ignore_ascii_case("json") {
        &after[body_start..]
    } else if info.starts_with('{') {
        // Object starts on the fence line itself.
        after
    } else {
        return None;
    };
    Some(body.find("```").map_or(body, |end| &body[..end]))
}

/// Decode `raw` into a JSON object, trying progressively more forgiving
/// strategies:
///
/// 1. direct decode when the text starts with `{`
/// 2. decode the fenced code block, if any
/// 3. [`extract_first_object`] then decode
/// 4. [`extract_first_object`], [`repair`], then decode
///
/// Steps 3 and 4 try the fenced block first, then the whole text. Never
/// fails: the last resort is a [`RawTextFallback`] carrying the original text.
pub fn parse_lenient(raw: &str) -> LenientParse {
    let trimmed = raw.trim();

    if trimmed.starts_with('{') {
        if let Some(map) = decode_object(trimmed) {
            return LenientParse::Parsed(map);
        }
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Some(map) = decode_object(block.trim()) {
            return LenientParse::Parsed(map);
        }
        if let Some(map) = recover_object(block) {
            return LenientParse::Parsed(map);
        }
    }

    if let Some(map) = recover_object(trimmed) {
        return LenientParse::Parsed(map);
    }

    LenientParse::Fallback(RawTextFallback {
        raw_analysis: raw.to_string(),
        error: DECODE_FAILURE.to_string(),
    })
}

/// Steps 3 and 4 over `text`.
fn recover_object(text: &str) -> Option<Map<String, Value>> {
    let candidate = extract_first_object(text);
    if candidate.is_empty() {
        return None;
    }
    if let Some(map) = decode_object(candidate) {
        return Some(map);
    }
    let map = decode_object(&repair(candidate))?;
    tracing::debug!("decoded response after syntactic repair");
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_ignores_braces_inside_strings() {
        assert_eq!(
            extract_first_object(r#"noise {"a": "b{c}"} trailing"#),
            r#"{"a": "b{c}"}"#
        );
    }

    #[test]
    fn extract_honours_escaped_quotes() {
        let text = r#"x {"a": "say \"}\" now", "b": {"c": 1}} y"#;
        assert_eq!(
            extract_first_object(text),
            r#"{"a": "say \"}\" now", "b": {"c": 1}}"#
        );
    }

    #[test]
    fn extract_without_brace_is_empty() {
        assert_eq!(extract_first_object("no json here"), "");
    }

    #[test]
    fn extract_returns_unbalanced_tail() {
        assert_eq!(extract_first_object(r#"ok {"a": [1, "#), r#"{"a": [1, "#);
    }

    #[test]
    fn repair_closes_quote_then_bracket_then_brace() {
        let fixed = repair(r#"{"a": [1, 2, "x"#);
        assert_eq!(fixed, r#"{"a": [1, 2, "x"]}"#);
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value, json!({"a": [1, 2, "x"]}));
    }

    #[test]
    fn repair_strips_single_trailing_comma() {
        assert_eq!(repair(r#"{"a": 1,"#), r#"{"a": 1}"#);
    }

    #[test]
    fn lenient_direct_object() {
        let parsed = parse_lenient(r#"  {"overall": {"pattern": "x"}}  "#);
        assert_eq!(
            parsed.as_object().unwrap()["overall"],
            json!({"pattern": "x"})
        );
    }

    #[test]
    fn lenient_fenced_block() {
        let raw = "Here you go:\n```json\n{\"palaces\": {}}\n```\nthanks";
        let parsed = parse_lenient(raw);
        assert!(parsed.as_object().unwrap().contains_key("palaces"));
    }

    #[test]
    fn lenient_truncated_fenced_block_is_repaired() {
        let raw = "```json\n{\"overall\": {\"pattern\": \"紫府同宫";
        let parsed = parse_lenient(raw).into_object().unwrap();
        assert_eq!(parsed["overall"]["pattern"], json!("紫府同宫"));
    }

    #[test]
    fn lenient_object_inside_prose() {
        let raw = r#"Sure! {"suggestions": {"solutions": ["rest"]}} Hope it helps."#;
        let parsed = parse_lenient(raw);
        assert!(parsed.as_object().unwrap().contains_key("suggestions"));
    }

    #[test]
    fn lenient_falls_back_with_raw_text() {
        let raw = "I cannot produce JSON today.";
        match parse_lenient(raw) {
            LenientParse::Fallback(fallback) => {
                assert_eq!(fallback.raw_analysis, raw);
                assert_eq!(fallback.error, DECODE_FAILURE);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn lenient_rejects_non_object_json() {
        assert!(parse_lenient("[1, 2, 3]").is_fallback());
    }

    #[test]
    fn lenient_object_after_prose_fence() {
        let raw = "```\nnote: see below\n```\n{\"overall\": {\"pattern\": \"x\"}}";
        let parsed = parse_lenient(raw).into_object().unwrap();
        assert_eq!(parsed["overall"]["pattern"], json!("x"));
    }
}
