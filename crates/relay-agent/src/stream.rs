use relay_core::types::{EventKind, StreamEvent};
use serde_json::Value;

/// Parse one line of `claude --output-format stream-json` output.
///
/// Returns `None` for blank lines and for anything that is not valid JSON.
/// The protocol grows new line types over time, so undecodable input is
/// dropped instead of failing the stream. Decodable lines with an
/// unrecognized `type` come back as [`EventKind::Unknown`].
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: Value = serde_json::from_str(line).ok()?;
    let token = raw
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let event = match raw.get("type").and_then(|v| v.as_str()) {
        Some("system") => StreamEvent::new(EventKind::System, "", Value::Null).with_token(token),
        Some("assistant") => {
            let text = assistant_text(&raw);
            StreamEvent::new(EventKind::TextDelta, text, Value::Null).with_token(token)
        }
        Some("result") => {
            let text = raw
                .get("result")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            StreamEvent::new(EventKind::Final, text, Value::Null).with_token(token)
        }
        _ => StreamEvent::new(EventKind::Unknown, "", Value::Null),
    };

    Some(StreamEvent { raw, ..event })
}

/// Concatenate the `text` blocks of an assistant message, skipping
/// `tool_use` and any other non-text block.
fn assistant_text(raw: &Value) -> String {
    let Some(blocks) = raw.pointer("/message/content").and_then(|v| v.as_array()) else {
        return String::new();
    };

    blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect()
}
