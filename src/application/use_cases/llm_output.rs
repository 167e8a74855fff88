use crate::domain::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static INTERNAL_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<internal>[\s\S]*?</internal>").unwrap());

static TRAILING_COMMA_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Removes reasoning blocks some models emit ahead of the answer.
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").to_string();
    cleaned = INTERNAL_TAG_PATTERN.replace_all(&cleaned, "").to_string();
    cleaned.trim().to_string()
}

fn strip_code_fence(value: &str) -> &str {
    let trimmed = value.trim();
    let body = if let Some(stripped) = trimmed.strip_prefix("```json") {
        stripped
    } else if let Some(stripped) = trimmed.strip_prefix("```") {
        stripped
    } else {
        return trimmed;
    };
    body.trim().trim_end_matches("```").trim()
}

/// First balanced `{...}` or `[...]` block, ignoring brackets inside strings.
fn first_balanced_block(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the JSON document a model returned, tolerating fences, prose and trailing commas.
///
/// Fails with `SchemaViolation` when no JSON value can be recovered.
pub fn parse_json_response(raw: &str) -> Result<Value> {
    let cleaned = clean_llm_response(raw);
    let unfenced = strip_code_fence(&cleaned);

    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    let block = first_balanced_block(unfenced).ok_or_else(|| {
        AppError::SchemaViolation("response does not contain a JSON object".to_string())
    })?;
    serde_json::from_str::<Value>(block)
        .or_else(|_| serde_json::from_str::<Value>(&TRAILING_COMMA_PATTERN.replace_all(block, "$1")))
        .map_err(|e| AppError::SchemaViolation(format!("response is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>The actual response";
        assert_eq!(clean_llm_response(input), "The actual response");
        assert_eq!(clean_llm_response("<think />Answer"), "Answer");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"status\": \"ready\"}\n```";
        assert_eq!(parse_json_response(raw).unwrap(), json!({"status": "ready"}));
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let raw = "Sure! Here you go:\n{\"notes\": \"uses {braces} inside\", \"questions\": []}\nHope it helps.";
        assert_eq!(
            parse_json_response(raw).unwrap(),
            json!({"notes": "uses {braces} inside", "questions": []})
        );
    }

    #[test]
    fn test_parse_bare_array_and_trailing_commas() {
        let raw = "<think>plan</think>Result: [{\"id\": \"TC-01\",},]";
        assert_eq!(parse_json_response(raw).unwrap(), json!([{"id": "TC-01"}]));
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert!(matches!(
            parse_json_response("I cannot help with that."),
            Err(AppError::SchemaViolation(_))
        ));
    }
}
