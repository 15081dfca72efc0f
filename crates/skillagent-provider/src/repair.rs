//! Best-effort recovery of structured data from model text
//!
//! Models wrap JSON in markdown fences, add prose around it, leave comments
//! and trailing commas behind, or get cut off mid-answer. Recovery runs in
//! two stages:
//!
//! 1. Extraction: strip fences and take the first balanced object/array.
//! 2. Repair, in order: strip fences, strip comments, trim trailing
//!    separators, double-quote single-quoted keys, truncate to the last
//!    closing bracket.
//!
//! Nothing here panics; failure is a [`RepairError`] value.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Why no structured value could be recovered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    /// Input was blank
    #[error("response contained no text")]
    Empty,

    /// Extraction and repair both failed to produce parseable data
    #[error("could not recover structured data: {0}")]
    Unrecoverable(String),
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        // Drop the language tag line (```json)
        body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }

    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

/// Find the first balanced JSON object or array, ignoring brackets in strings
fn balanced_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract the first complete structured value from noisy text
pub fn extract_structured(text: &str) -> Option<&str> {
    balanced_slice(strip_code_fences(text))
}

/// Remove `//` and `/* */` comments outside of string literals
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn compile(pattern: &str) -> Result<Regex, RepairError> {
    Regex::new(pattern)
        .map_err(|e| RepairError::Unrecoverable(format!("invalid repair pattern: {}", e)))
}

/// Apply the ordered repair passes and return the candidate text
pub fn repair_structured(text: &str) -> Result<String, RepairError> {
    let stripped = strip_code_fences(text);
    let without_comments = strip_comments(stripped);

    let trailing = compile(r",(\s*[}\]])")?;
    let without_trailing = trailing.replace_all(&without_comments, "$1");

    let quoted_keys = compile(r#"'([^'\\"]*)'(\s*):"#)?;
    let requoted = quoted_keys.replace_all(&without_trailing, "\"$1\"$2:");

    let start = requoted.find(['{', '[']).unwrap_or(0);
    let end = requoted
        .rfind(['}', ']'])
        .map_or(requoted.len(), |idx| idx + 1);

    if start >= end {
        return Err(RepairError::Unrecoverable(
            "no bracketed value found".to_string(),
        ));
    }

    Ok(requoted[start..end].to_string())
}

/// Parse model text into a structured value, repairing once if needed
pub fn parse_structured(text: &str) -> Result<Value, RepairError> {
    if text.trim().is_empty() {
        return Err(RepairError::Empty);
    }

    if let Some(candidate) = extract_structured(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    let repaired = repair_structured(text)?;
    serde_json::from_str::<Value>(&repaired).map_err(|e| RepairError::Unrecoverable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let value = parse_structured(r#"{"intent": "quiz", "confidence": 0.9}"#).unwrap();
        assert_eq!(value, json!({"intent": "quiz", "confidence": 0.9}));
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
        assert_eq!(parse_structured(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_prose_around_json() {
        let text = "Sure! Here is the result:\n{\"a\": {\"b\": [1, 2]}}\nHope this helps.";
        assert_eq!(extract_structured(text), Some("{\"a\": {\"b\": [1, 2]}}"));
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let text = r#"{"stem": "evaluate f(x) = {x | x > 0}", "n": 1} trailing"#;
        assert_eq!(
            parse_structured(text).unwrap(),
            json!({"stem": "evaluate f(x) = {x | x > 0}", "n": 1})
        );
    }

    #[test]
    fn test_array_of_records_is_kept_whole() {
        let text = r#"[{"intent": "explain"}, {"intent": "quiz"}]"#;
        let value = parse_structured(text).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_comments_and_trailing_commas() {
        let text = r#"```json
{
  // the label
  "intent": "quiz", /* inline */
  "source": "https://example.com/x",
  "tags": ["a", "b",],
}
```"#;
        let value = parse_structured(text).unwrap();
        assert_eq!(value["intent"], "quiz");
        assert_eq!(value["source"], "https://example.com/x");
        assert_eq!(value["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_single_quoted_keys() {
        let value = parse_structured("{'intent': \"quiz\", 'confidence': 0.7}").unwrap();
        assert_eq!(value["confidence"], 0.7);
    }

    #[test]
    fn test_truncates_after_last_closing_bracket() {
        let repaired = repair_structured("{\"a\": 1,}\n\nLet me know!").unwrap();
        assert_eq!(repaired, "{\"a\": 1}");
    }

    #[test]
    fn test_unrecoverable_text() {
        assert_eq!(parse_structured("   "), Err(RepairError::Empty));
        assert!(matches!(
            parse_structured("This is not JSON"),
            Err(RepairError::Unrecoverable(_))
        ));
        assert!(parse_structured("{\"a\": [1, 2").is_err());
    }
}
