//! Decoding of payloads arriving on the command channel.

use serde_json::{Map, Value};

/// Sentinel command the server attaches to its own greeting.
pub const SYSTEM_GREETING: &str = "system_greeting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Greeting(String),
    CommandResult { command: String, response: String },
    PlainText(String),
    ErrorMessage(String),
}

/// Text of a field the way the server's loosely typed JSON means it: absent,
/// null, false, zero and empty strings count as missing; other scalars and
/// nested values are rendered as JSON.
fn field_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse a raw channel payload. Never fails: anything that is not a JSON
/// object with a recognised field comes back as [`InboundMessage::PlainText`]
/// holding the raw payload.
pub fn parse_inbound(raw: &str) -> InboundMessage {
    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => object,
        _ => return InboundMessage::PlainText(raw.to_string()),
    };

    if let Some(error) = field_text(&object, "error") {
        return InboundMessage::ErrorMessage(error);
    }

    if object.get("type").and_then(Value::as_str) == Some("greeting") {
        return InboundMessage::Greeting(field_text(&object, "response").unwrap_or_default());
    }

    match field_text(&object, "response") {
        Some(response) => InboundMessage::CommandResult {
            command: field_text(&object, "command").unwrap_or_default(),
            response,
        },
        None => InboundMessage::PlainText(raw.to_string()),
    }
}
