//! Request/response envelope helpers shared by the HTTP transports.
//!
//! Converts a `CallRequest` into Gemini-style `contents` and pulls the
//! primary text back out of `candidates[0].content.parts`.

use serde_json::{Value, json};

use crate::types::CallRequest;

/// Single user turn holding `text`
pub fn user_turn(text: &str) -> Value {
    json!([{ "role": "user", "parts": [{ "text": text }] }])
}

/// Normalize a raw payload into a `contents` array.
///
/// A payload already carrying `contents` passes through; strings and objects
/// with a `text` field become one text part; anything else is serialized.
pub fn contents_from_raw(raw: &Value) -> Value {
    match raw {
        Value::Null => user_turn(""),
        Value::String(text) => user_turn(text),
        Value::Object(map) => match (map.get("contents"), map.get("text")) {
            (Some(contents @ Value::Array(_)), _) => contents.clone(),
            (_, Some(Value::String(text))) => user_turn(text),
            _ => user_turn(&raw.to_string()),
        },
        other => user_turn(&other.to_string()),
    }
}

/// Contents for a request: the raw payload if given, else the joined prompt
pub fn contents_for(request: &CallRequest) -> Value {
    match &request.raw {
        Some(raw) => contents_from_raw(raw),
        None => user_turn(&request.prompt_text()),
    }
}

/// Text parts of the first candidate, joined by a blank line
pub fn candidate_text(body: &Value) -> Option<String> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(text)
}
