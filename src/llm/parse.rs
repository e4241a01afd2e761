//! Recovering a JSON object from free-form model output.
//!
//! Models wrap JSON in prose and Markdown fences and leave trailing commas
//! behind. Extraction runs in fixed steps:
//!
//! 1. strip a leading/trailing fenced-code marker
//! 2. take the outermost balanced `{...}` span
//! 3. drop commas that directly precede `}` or `]`
//! 4. parse; on failure also strip `//` and `/* */` comments and parse again
//!
//! When a span still fails to parse, the next `{` after its start is tried.
//!
//! All scanning is string-literal aware, so braces, commas and slashes inside
//! JSON strings are never touched.

use std::sync::LazyLock;

use regex::Regex;

use crate::llm::{LlmError, LlmResult};

static RE_FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

static RE_FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").unwrap());

/// Extract and parse the JSON object embedded in `raw`.
///
/// Every balanced `{...}` span is tried in order of its opening brace, so a
/// brace group in leading prose does not hide the answer behind it.
pub fn extract_json_object(raw: &str) -> LlmResult<serde_json::Value> {
    let unfenced = strip_code_fence(raw);
    let mut first_err = None;

    for span in object_candidates(&unfenced) {
        match parse_span(span) {
            Ok(value) => return Ok(value),
            Err(e) if first_err.is_none() => first_err = Some(e),
            Err(_) => {}
        }
    }

    match first_err {
        Some(e) => Err(LlmError::malformed(format!("invalid JSON after cleanup: {e}"), raw)),
        None => Err(LlmError::malformed("no balanced JSON object found", raw)),
    }
}

/// Parse one candidate span, retrying once with comments removed.
fn parse_span(span: &str) -> Result<serde_json::Value, serde_json::Error> {
    let cleaned = remove_trailing_commas(span);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(e) => {
            let decommented = remove_trailing_commas(&strip_comments(&cleaned));
            serde_json::from_str(&decommented).map_err(|_| e)
        }
    }
}

/// Remove one leading and one trailing Markdown fence, if present.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let opened = RE_FENCE_OPEN.replace(trimmed, "");
    RE_FENCE_CLOSE.replace(&opened, "").trim().to_string()
}

/// Byte-level lexer state shared by the scanners below.
#[derive(Default)]
struct StringTracker {
    in_string: bool,
    escaped: bool,
}

impl StringTracker {
    /// Feed one byte; returns true when the byte belongs to a string literal
    /// (including its quotes).
    fn step(&mut self, b: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
            }
            true
        } else if b == b'"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

/// The first `{` that has a matching `}`, and everything between them.
pub fn outermost_object(text: &str) -> Option<&str> {
    object_candidates(text).next()
}

/// Every balanced `{...}` span, one per opening brace, in order of the brace.
fn object_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('{')
        .filter_map(move |(start, _)| balanced_from(text, start))
}

/// The span from the `{` at `start` to its matching `}`.
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut tracker = StringTracker::default();
    let mut depth = 0usize;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if tracker.step(b) {
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop every comma whose next non-whitespace byte is `}` or `]`.
pub fn remove_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut tracker = StringTracker::default();
    let mut last = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if tracker.step(b) || b != b',' {
            continue;
        }
        let next = bytes[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
        if matches!(next, Some(b'}') | Some(b']')) {
            out.push_str(&text[last..i]);
            last = i + 1;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Remove `//` line comments and `/* */` block comments outside strings.
pub fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut tracker = StringTracker::default();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if tracker.step(b) || b != b'/' || i + 1 >= bytes.len() {
            i += 1;
            continue;
        }
        let end = match bytes[i + 1] {
            b'/' => bytes[i..]
                .iter()
                .position(|&c| c == b'\n')
                .map_or(bytes.len(), |p| i + p),
            b'*' => text[i + 2..]
                .find("*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2),
            _ => {
                i += 1;
                continue;
            }
        };
        out.push_str(&text[last..i]);
        last = end;
        i = end;
    }
    out.push_str(&text[last.min(text.len())..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FailureKind;
    use serde_json::json;

    #[test]
    fn bare_object_parses() {
        let v = extract_json_object(r#"{"value": "+R", "reasoning": "essential"}"#).unwrap();
        assert_eq!(v, json!({"value": "+R", "reasoning": "essential"}));
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let bare = r#"{"selected_class": "Continuant", "reasoning": "persists"}"#;
        let wrapped = format!("Here is my answer:\n{bare}\nLet me know if you need more.");
        assert_eq!(
            extract_json_object(&wrapped).unwrap(),
            extract_json_object(bare).unwrap()
        );
    }

    #[test]
    fn fenced_object_matches_bare() {
        let bare = r#"{"classification": "Role", "confidence": "High"}"#;
        let fenced = format!("```json\n{bare}\n```");
        let plain_fence = format!("```\n{bare}\n```\n");
        assert_eq!(extract_json_object(&fenced).unwrap(), json!({"classification": "Role", "confidence": "High"}));
        assert_eq!(extract_json_object(&plain_fence).unwrap(), extract_json_object(bare).unwrap());
    }

    #[test]
    fn trailing_commas_removed() {
        let messy = "{\"a\": [1, 2, 3,], \"b\": {\"c\": true,},\n}";
        assert_eq!(
            extract_json_object(messy).unwrap(),
            json!({"a": [1, 2, 3], "b": {"c": true}})
        );
    }

    #[test]
    fn commas_inside_strings_survive() {
        let text = r#"{"reasoning": "a list like [x, y,] stays, }", "v": 1,}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["reasoning"], "a list like [x, y,] stays, }");
        assert_eq!(v["v"], 1);
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let text = r#"prefix {"note": "use {curly} braces", "ok": true} suffix }"#;
        assert_eq!(outermost_object(text), Some(r#"{"note": "use {curly} braces", "ok": true}"#));
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let text = r#"{"quote": "he said \"hi, }\"", "n": 2}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["quote"], "he said \"hi, }\"");
    }

    #[test]
    fn stray_unbalanced_brace_before_object() {
        let text = r#"Consider the set { of things. {"value": "-I"}"#;
        // The first `{` never closes, so the scanner moves on to the next one.
        let v = extract_json_object(text).unwrap();
        assert_eq!(v, json!({"value": "-I"}));
    }

    #[test]
    fn brace_group_in_leading_prose_is_skipped() {
        let bare = r#"{"value": "+R", "reasoning": "a person is necessarily a person"}"#;
        let wrapped = format!("The allowed values are {{+R, -R, ~R}}. My answer:\n{bare}\nDone.");
        assert_eq!(
            extract_json_object(&wrapped).unwrap(),
            extract_json_object(bare).unwrap()
        );
    }

    #[test]
    fn nested_candidate_inside_broken_object() {
        // The outer span is not JSON, but the object nested in it is.
        let text = r#"{options: {+U, ~U}, answer: {"value": "~U"}}"#;
        assert_eq!(extract_json_object(text).unwrap(), json!({"value": "~U"}));
    }

    #[test]
    fn every_candidate_failing_reports_first_error() {
        let raw = "Pick from {+D, -D} or {yes, no}.";
        let err = extract_json_object(raw).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
        assert!(err.to_string().contains("invalid JSON after cleanup"));
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn comments_stripped_as_fallback() {
        let text = "{\n  \"value\": \"+U\", // unity\n  /* chosen */ \"reasoning\": \"whole\",\n}";
        assert_eq!(
            extract_json_object(text).unwrap(),
            json!({"value": "+U", "reasoning": "whole"})
        );
    }

    #[test]
    fn urls_in_strings_are_not_comments() {
        let text = r#"{"source": "https://example.org/x", "v": 1}"#;
        assert_eq!(strip_comments(text), text);
    }

    #[test]
    fn no_object_is_malformed_with_raw_text() {
        let raw = "I cannot classify this term.";
        let err = extract_json_object(raw).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn unparseable_object_is_malformed_with_raw_text() {
        let raw = "{value: +R}";
        let err = extract_json_object(raw).unwrap_err();
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn student_example_with_fence_and_trailing_comma() {
        let raw = "```json\n{\"properties\":{\"rigidity\":\"~R\",\"identity\":\"+I\",\
                   \"own_identity\":\"-O\",\"unity\":\"+U\",\"dependence\":\"+D\",},\
                   \"classification\":\"Role\"}\n```";
        let v = extract_json_object(raw).unwrap();
        assert_eq!(v["properties"]["rigidity"], "~R");
        assert_eq!(v["properties"]["dependence"], "+D");
        assert_eq!(v["classification"], "Role");
    }
}
