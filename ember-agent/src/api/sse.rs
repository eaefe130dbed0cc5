//! Incremental SSE decoding.
//!
//! Network chunks do not align with frame boundaries, so [`SseDecoder`]
//! buffers raw bytes and yields complete frames as they close. A frame is an
//! optional `event:` name plus one or more `data:` lines, terminated by a
//! blank line. Decoding a frame into a [`StreamEvent`] is a separate,
//! fallible step: one malformed frame must never abort the exchange.

use ember_rpc::{CodeBlock, InterruptRequest, StreamEvent, TodoItem};
use serde_json::Value;

/// A complete wire frame: the `event:` field (if any) and the joined payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Accumulates raw bytes and yields complete SSE frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: String,
}

impl SseDecoder {
    /// Feed one network chunk; returns every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
            self.take_line(&line, &mut frames);
        }
        frames
    }

    fn take_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            // Blank line closes the pending frame.
            if !self.data.is_empty() {
                frames.push(SseFrame {
                    event: self.event.take(),
                    data: std::mem::take(&mut self.data),
                });
            } else {
                self.event = None;
            }
            return;
        }
        if line.starts_with(':') {
            // Keep-alive comment.
            return;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
        } else if let Some(payload) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
        }
        // id: / retry: fields are irrelevant here and ignored.
    }

    /// Flush the trailing frame of a stream that ended without a final blank
    /// line. Some servers close the connection right after the last data line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        // Drain whatever is left in the line buffer first.
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = rest.trim_end_matches('\r').to_string();
            let mut frames = Vec::new();
            self.take_line(&line, &mut frames);
            if let Some(frame) = frames.into_iter().next() {
                return Some(frame);
            }
        }
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        })
    }
}

/// True when `message` matches the configured throttling vocabulary.
pub fn is_rate_limit_message(message: &str, markers: &[String]) -> bool {
    let lower = message.to_lowercase();
    markers.iter().any(|marker| lower.contains(&marker.to_lowercase()))
}

/// Decode one frame into a stream event.
///
/// Returns `None` for frames that should be skipped: keep-alives, `[DONE]`
/// guards, unrecognized frame kinds, and payloads that fail to parse.
pub fn decode_frame(frame: &SseFrame, rate_limit_markers: &[String]) -> Option<StreamEvent> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            let sample: String = data.chars().take(120).collect();
            tracing::warn!("skipping malformed SSE frame ({}): {}", err, sample);
            return None;
        }
    };

    // The `event:` name is authoritative. Backends that tag every frame
    // `message` put the discriminator in the payload's `type` field instead.
    let kind = match frame.event.as_deref() {
        Some("message") | None => json.get("type").and_then(Value::as_str).map(str::to_string),
        Some(other) => Some(other.to_string()),
    };

    match kind.as_deref() {
        Some("content") => {
            let text = json
                .get("text")
                .or_else(|| json.get("chunk"))
                .and_then(Value::as_str)?
                .to_string();
            Some(StreamEvent::Content { text })
        }
        Some("code_block") => {
            let block = json.get("code_block")?;
            serde_json::from_value::<CodeBlock>(block.clone())
                .ok()
                .map(StreamEvent::CodeBlock)
        }
        Some("status") => {
            let message = json.get("message").and_then(Value::as_str)?.to_string();
            Some(StreamEvent::Status { message })
        }
        Some("tool_call") => {
            let name = json.get("name").and_then(Value::as_str)?.to_string();
            let args = json.get("args").cloned().unwrap_or(Value::Null);
            Some(StreamEvent::ToolCall { name, args })
        }
        Some("todos") => {
            let items = json.get("todos").or_else(|| json.get("items"))?;
            let todos: Vec<TodoItem> = serde_json::from_value(items.clone()).ok()?;
            Some(StreamEvent::TodoUpdate(todos))
        }
        Some("complete") | Some("done") => Some(StreamEvent::Completed {
            session_id: completion_session_id(&json),
        }),
        Some("error") => Some(error_event(&json, rate_limit_markers)),
        _ => decode_untyped(&json, rate_limit_markers),
    }
}

/// Untyped frame: an interrupt carries both a session identifier and an
/// action name; anything carrying an error message is a terminal error.
fn decode_untyped(json: &Value, rate_limit_markers: &[String]) -> Option<StreamEvent> {
    if json.get("session_id").is_some() && json.get("action").is_some() {
        return serde_json::from_value::<InterruptRequest>(json.clone())
            .ok()
            .map(StreamEvent::Interrupt);
    }
    if json.get("error").is_some() || json.get("message").is_some() {
        return Some(error_event(json, rate_limit_markers));
    }
    tracing::debug!("ignoring unrecognized SSE frame: {}", json);
    None
}

fn error_event(json: &Value, rate_limit_markers: &[String]) -> StreamEvent {
    // Providers disagree on the shape: a bare string, a nested
    // `{"error": {"message": ...}}` object, or a top-level `message`.
    let message = json
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| json.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| json.get("message").and_then(Value::as_str))
        .unwrap_or("unknown backend error")
        .to_string();
    let rate_limited = is_rate_limit_message(&message, rate_limit_markers);
    StreamEvent::Error { message, rate_limited }
}

fn completion_session_id(json: &Value) -> Option<String> {
    json.get("session_id")
        .or_else(|| json.pointer("/metadata/conversation_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
