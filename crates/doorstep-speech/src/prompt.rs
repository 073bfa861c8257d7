// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis prompt and lenient parsing of the model's JSON answer.

use std::str::FromStr;

use doorstep_core::{Intent, Priority, Sentiment};
use serde_json::Value;

/// System prompt for intent extraction.
pub const ANALYSIS_PROMPT: &str = "You analyze short voicemail transcripts left by customers \
for an upcoming delivery. Respond with a single JSON object and nothing else, using exactly \
these keys:\n\
- \"sentiment\": one of \"positive\", \"neutral\", \"negative\"\n\
- \"instructions\": array of short delivery instructions\n\
- \"time_sensitive\": boolean\n\
- \"conditions\": array of short delivery conditions, e.g. \"leave at door\", \"no signature\"\n\
- \"priority\": one of \"low\", \"medium\", \"high\", \"urgent\"\n\
- \"concerns\": array of short customer concerns\n\
Use empty arrays when nothing applies.";

/// Parses the model output into an intent.
///
/// Accepts a bare JSON object or one wrapped in a Markdown code fence.
/// Unknown enum values fall back to defaults; a scalar where a list is
/// expected becomes a one-element list. Returns `None` unless the content is
/// a JSON object.
pub fn parse_intent_response(content: &str) -> Option<Intent> {
    let value: Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    let object = value.as_object()?;

    let mut intent = Intent::default();
    if let Some(raw) = object.get("sentiment").and_then(Value::as_str) {
        intent.sentiment = Sentiment::from_str(raw.trim()).unwrap_or_default();
    }
    if let Some(raw) = object.get("priority").and_then(Value::as_str) {
        intent.priority = Priority::from_str(raw.trim()).unwrap_or_default();
    }
    intent.time_sensitive = match object.get("time_sensitive") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };
    intent.conditions = string_list(object.get("conditions"));
    intent.concerns = string_list(object.get("concerns"));
    intent.instructions = string_list(object.get("instructions"));

    Some(intent.normalized())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let intent = parse_intent_response(
            r#"{"sentiment":"negative","priority":"high","time_sensitive":true,
                "conditions":["leave at door"],"concerns":["late last time"],
                "instructions":["ring twice"]}"#,
        )
        .unwrap();
        assert_eq!(intent.sentiment, Sentiment::Negative);
        assert_eq!(intent.priority, Priority::High);
        assert!(intent.time_sensitive);
        assert_eq!(intent.conditions, vec!["leave at door"]);
        assert_eq!(intent.concerns, vec!["late last time"]);
        assert_eq!(intent.instructions, vec!["ring twice"]);
    }

    #[test]
    fn parses_fenced_object_with_loose_values() {
        let intent = parse_intent_response(
            "```json\n{\"priority\":\"URGENT\",\"time_sensitive\":\"true\",\"conditions\":\"no signature\",\"sentiment\":\"meh\"}\n```",
        )
        .unwrap();
        assert_eq!(intent.priority, Priority::Urgent);
        assert!(intent.time_sensitive);
        assert_eq!(intent.conditions, vec!["no signature"]);
        assert_eq!(intent.sentiment, Sentiment::Neutral);
        assert!(intent.concerns.is_empty());
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_intent_response("Sure! The customer sounds urgent.").is_none());
        assert!(parse_intent_response("[1, 2]").is_none());
        assert!(parse_intent_response("").is_none());
    }

    #[test]
    fn duplicate_entries_are_collapsed() {
        let intent =
            parse_intent_response(r#"{"concerns":["dog", " dog ", ""]}"#).unwrap();
        assert_eq!(intent.concerns, vec!["dog"]);
    }
}
