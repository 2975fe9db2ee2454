use serde_json::Value;
use tracing::trace;

use crate::events::ChatStreamEvent;

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        self.push_utf8(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                events.push(ChatStreamEvent::Done);
                continue;
            }

            match serde_json::from_str::<Value>(&payload) {
                Ok(value) => events.extend(map_chunk(&value)),
                Err(error) => trace!(%error, "skipping non-JSON SSE payload"),
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    /// Flushes a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<ChatStreamEvent> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        self.buffer.push_str("\n\n");
        self.feed(&[])
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.pending_bytes.is_empty()
    }

    /// Appends bytes, holding back an incomplete UTF-8 sequence at the tail
    /// and normalizing CRLF line endings.
    fn push_utf8(&mut self, bytes: &[u8]) {
        self.pending_bytes.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(error) if error.error_len().is_none() => error.valid_up_to(),
            Err(_) => self.pending_bytes.len(),
        };

        let complete: Vec<u8> = self.pending_bytes.drain(..valid_up_to).collect();
        let text = String::from_utf8_lossy(&complete);
        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(&text);
        }
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_chunk(value: &Value) -> Vec<ChatStreamEvent> {
    if let Some(error) = value.get("error") {
        let (code, message) = match error {
            Value::String(message) => (None, Some(message.clone())),
            other => (
                other.get("code").and_then(value_text),
                other
                    .get("message")
                    .and_then(|value| value.as_str())
                    .map(ToString::to_string),
            ),
        };
        return vec![ChatStreamEvent::Error { code, message }];
    }

    let Some(choice) = value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(delta) = choice.get("delta") {
        if let Some(content) = delta.get("content").and_then(|value| value.as_str()) {
            if !content.is_empty() {
                events.push(ChatStreamEvent::TextDelta {
                    delta: content.to_owned(),
                });
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(|value| value.as_array()) {
            for (position, call) in tool_calls.iter().enumerate() {
                let index = call
                    .get("index")
                    .and_then(|value| value.as_u64())
                    .and_then(|value| usize::try_from(value).ok())
                    .unwrap_or(position);
                let function = call.get("function");
                events.push(ChatStreamEvent::ToolCallDelta {
                    index,
                    id: non_empty_str(call.get("id")),
                    name: non_empty_str(function.and_then(|function| function.get("name"))),
                    arguments: function
                        .and_then(|function| function.get("arguments"))
                        .and_then(|value| value.as_str())
                        .map(ToString::to_string),
                });
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|value| value.as_str()) {
        events.push(ChatStreamEvent::Finished {
            reason: reason.to_owned(),
        });
    }

    events
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
