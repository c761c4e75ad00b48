//! Extracting JSON payloads from free-form LLM responses.
//!
//! Responses may wrap JSON in markdown fences or surround it with prose.
//! Extraction tries, in order: a fenced block, the whole trimmed content,
//! then the first balanced object or array.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::LlmError;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fence regex is valid")
    })
}

/// Index of the bracket closing the one at the start of `s`.
///
/// String literals and escapes are skipped.
pub fn find_matching_close(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, open) = chars.next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 1usize;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, c) in chars {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if !in_string && c == open => depth += 1,
            c if !in_string && c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The first valid JSON document found in `content`.
pub fn extract_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let is_json = |s: &str| serde_json::from_str::<serde_json::Value>(s).is_ok();

    for captures in fence_regex().captures_iter(trimmed) {
        if let Some(body) = captures.get(1).map(|m| m.as_str().trim()) {
            if is_json(body) {
                return Some(body.to_string());
            }
        }
    }

    if is_json(trimmed) {
        return Some(trimmed.to_string());
    }

    for (start, c) in trimmed.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        if let Some(end) = find_matching_close(&trimmed[start..]) {
            let candidate = &trimmed[start..=start + end];
            if is_json(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    None
}

/// Extract and deserialize a JSON payload from an LLM response.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let json = extract_json(content).ok_or_else(|| {
        let preview: String = content.chars().take(80).collect();
        LlmError::ParseError(format!("no JSON found in response starting with '{}'", preview))
    })?;
    serde_json::from_str(&json)
        .map_err(|e| LlmError::ParseError(format!("unexpected JSON shape: {}", e)))
}
