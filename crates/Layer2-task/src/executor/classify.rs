//! Line classification for streamed agent output
//!
//! Each output line is routed to the result channel, the error channel,
//! or dropped. The agent's wire format is not ours to control, so the
//! classifier is a trait and the JSON-aware one is best-effort.

use serde_json::Value;

/// Destination of a classified line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Result,
    Error,
}

/// Routes one (ANSI-stripped) output line to zero or more channels
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Vec<(Channel, String)>;
}

/// Everything non-blank goes to the result channel
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainClassifier;

impl LineClassifier for PlainClassifier {
    fn classify(&self, line: &str) -> Vec<(Channel, String)> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        vec![(Channel::Result, line.to_string())]
    }
}

/// Understands `--output-format stream-json` style events, falling back
/// to plain text for anything that is not a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamJsonClassifier;

impl StreamJsonClassifier {
    fn classify_value(&self, v: &Value) -> Vec<(Channel, String)> {
        if let Some(error) = v.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            };
            return vec![(Channel::Error, format!("Error: {}", message))];
        }

        let content = v
            .get("content")
            .or_else(|| v.get("message").and_then(|m| m.get("content")));

        match content {
            Some(Value::String(text)) => vec![(Channel::Result, text.clone())],
            Some(Value::Array(items)) => items.iter().filter_map(content_block).collect(),
            _ => Vec::new(),
        }
    }
}

fn content_block(item: &Value) -> Option<(Channel, String)> {
    match item.get("type").and_then(|t| t.as_str()) {
        Some("text") | Some("output_text") => item
            .get("text")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| (Channel::Result, t.to_string())),
        Some("tool_use") => {
            let name = item.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
            let input = item.get("input").cloned().unwrap_or(Value::Null);
            Some((Channel::Result, format!("[Tool Use: {} - {}]", name, input)))
        }
        _ => None,
    }
}

impl LineClassifier for StreamJsonClassifier {
    fn classify(&self, line: &str) -> Vec<(Channel, String)> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
                return self.classify_value(&v);
            }
        }

        if trimmed.contains("[ERROR]") {
            vec![(Channel::Error, line.to_string())]
        } else {
            vec![(Channel::Result, line.to_string())]
        }
    }
}
