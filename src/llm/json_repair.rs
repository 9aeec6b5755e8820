//! JSON Repair
//!
//! LLM responses frequently arrive wrapped in markdown fences, prefixed with
//! prose, or truncated mid-structure. This module extracts and repairs the
//! embedded JSON before schema validation declares a violation.
//!
//! Handled cases:
//! - code fence wrapping (```json ... ```)
//! - JSON embedded in explanatory text
//! - trailing commas
//! - missing closing braces/brackets

use serde_json::Value;
use tracing::debug;

use crate::types::{Result, TaxonomyError};

/// Parse `raw` as JSON, attempting extraction and repair when the direct
/// parse fails. Returns the value and whether repair was needed.
pub fn parse_or_repair(raw: &str) -> Result<(Value, bool)> {
    let cleaned = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok((value, false));
    }
    debug!("initial JSON parse failed, attempting repair");

    if let Some(extracted) = extract_embedded_json(&cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(&extracted) {
            return Ok((value, true));
        }
        let repaired = repair_structure(&extracted);
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            return Ok((value, true));
        }
    }

    let repaired = repair_structure(&cleaned);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return Ok((value, true));
    }

    Err(TaxonomyError::SchemaViolation {
        prompt: String::new(),
        detail: format!(
            "unparseable JSON response: {}",
            cleaned.chars().take(120).collect::<String>()
        ),
    })
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = trimmed
        .trim_start_matches("```")
        .trim_start_matches("json")
        .trim_start_matches("JSON");
    let without_close = without_open.trim_end().trim_end_matches("```");
    without_close.trim().to_string()
}

/// Locate the first balanced-looking JSON object or array inside free text.
fn extract_embedded_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if !in_string && c == open => depth += 1,
            c if !in_string && c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + offset].to_string());
                }
            }
            _ => {}
        }
    }
    // Unbalanced: hand back the tail so structural repair can close it.
    Some(text[start..].to_string())
}

/// Remove trailing commas and close unbalanced strings/brackets.
fn repair_structure(text: &str) -> String {
    let mut repaired = remove_trailing_commas(text);

    let mut in_string = false;
    let mut escaped = false;
    let mut stack = Vec::new();
    for ch in repaired.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }
    if in_string {
        repaired.push('"');
    }
    while let Some(close) = stack.pop() {
        repaired.push(close);
    }
    repaired
}

fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        match ch {
            '\\' if in_string => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            ',' if !in_string => {
                let next_significant = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next_significant, Some('}') | Some(']')) {
                    continue;
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_json_passes_through() {
        let (value, repaired) = parse_or_repair(r#"{"pass": true}"#).unwrap();
        assert_eq!(value, json!({"pass": true}));
        assert!(!repaired);
    }

    #[test]
    fn code_fences_are_stripped() {
        let raw = "```json\n{\"pass\": true, \"reason\": \"ok\"}\n```";
        let (value, repaired) = parse_or_repair(raw).unwrap();
        assert_eq!(value["pass"], json!(true));
        assert!(repaired);
    }

    #[test]
    fn json_embedded_in_prose_is_extracted() {
        let raw = "Here you go: {\"pass\": true, \"reason\": \"single token\"}";
        let (value, repaired) = parse_or_repair(raw).unwrap();
        assert_eq!(value["reason"], json!("single token"));
        assert!(repaired);
    }

    #[test]
    fn trailing_commas_are_removed() {
        let raw = r#"{"items": [1, 2, 3,],}"#;
        let (value, repaired) = parse_or_repair(raw).unwrap();
        assert_eq!(value["items"], json!([1, 2, 3]));
        assert!(repaired);
    }

    #[test]
    fn truncated_object_is_closed() {
        let raw = r#"{"label": "Biology", "aliases": ["Bio""#;
        let (value, repaired) = parse_or_repair(raw).unwrap();
        assert_eq!(value["label"], json!("Biology"));
        assert!(repaired);
    }

    #[test]
    fn hopeless_content_errors() {
        assert!(parse_or_repair("no json here at all").is_err());
    }
}
