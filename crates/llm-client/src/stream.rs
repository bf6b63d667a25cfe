//! Streaming chat completions.
//!
//! The response body is an SSE stream of `data:` lines, each a JSON
//! `chat.completion.chunk`, terminated by `data: [DONE]`. Chunks are
//! buffered, split on blank lines and mapped to [`StreamEvent`]s.

use std::collections::BTreeMap;
use std::pin::Pin;

use futures_util::Stream;
use tracing::warn;

use crate::api_types::{ChatCompletionChunk, FunctionCall, ToolCall, Usage};
use crate::error::LlmError;

/// Boxed stream of events from one streamed completion.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// An incremental event from a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Visible answer text.
    TextDelta(String),
    /// Reasoning trace text.
    ReasoningDelta(String),
    /// Fragment of a tool call; fragments share an `index`.
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Token usage, usually on the last chunk.
    Usage(Usage),
    /// The model stopped; `finish_reason` is e.g. "stop" or "tool_calls".
    Finish { finish_reason: String },
}

/// Extract complete `data:` payloads from an SSE byte buffer.
///
/// The buffer is drained in place; a trailing partial event stays for the
/// next call. Events are decoded only once complete, so a multibyte
/// character split across network chunks survives.
pub(crate) fn drain_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut data_lines = Vec::new();

    // Some servers send CRLF line endings. JSON payloads never carry a raw CR.
    buffer.retain(|b| *b != b'\r');

    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let block: Vec<u8> = buffer.drain(..pos + 2).collect();

        for line in String::from_utf8_lossy(&block).lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Map one `data:` payload to events. Unparseable payloads are skipped.
pub(crate) fn parse_chunk(data: &str) -> Vec<StreamEvent> {
    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Skipping malformed stream chunk: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    for choice in chunk.choices {
        let delta = choice.delta;

        if let Some(text) = delta.reasoning_content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::ReasoningDelta(text));
        }
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta(text));
        }
        for call in delta.tool_calls {
            let function = call.function.unwrap_or_default();
            events.push(StreamEvent::ToolCallDelta {
                index: call.index,
                id: call.id,
                name: function.name,
                arguments: function.arguments.unwrap_or_default(),
            });
        }
        if let Some(finish_reason) = choice.finish_reason {
            events.push(StreamEvent::Finish { finish_reason });
        }
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage));
    }

    events
}

/// Turn an SSE response into an [`EventStream`].
///
/// If the body ends without a finish reason, a `Finish { "stop" }` is emitted.
pub(crate) fn sse_event_stream(response: reqwest::Response) -> EventStream {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        'read: loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                }
                Ok(None) => {
                    if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                        buffer.extend_from_slice(b"\n\n");
                    }
                    for data in drain_data_lines(&mut buffer) {
                        if data == "[DONE]" {
                            break;
                        }
                        for event in parse_chunk(&data) {
                            finished |= matches!(event, StreamEvent::Finish { .. });
                            yield Ok(event);
                        }
                    }
                    break 'read;
                }
                Err(e) => {
                    yield Err(LlmError::from(e));
                    return;
                }
            }

            for data in drain_data_lines(&mut buffer) {
                if data == "[DONE]" {
                    break 'read;
                }
                for event in parse_chunk(&data) {
                    finished |= matches!(event, StreamEvent::Finish { .. });
                    yield Ok(event);
                }
            }
        }

        if !finished {
            yield Ok(StreamEvent::Finish { finish_reason: "stop".to_string() });
        }
    };

    Box::pin(stream)
}

/// Assembles streamed tool-call fragments into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one fragment.
    pub fn push(&mut self, index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id = Some(id.to_string());
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        call.arguments.push_str(arguments);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Complete calls in index order. Fragments that never got a name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", index)),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}
