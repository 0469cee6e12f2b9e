//! Server-sent event framing and the named event taxonomy.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use workspace_core::{FileChange, StreamEvent};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE parser fed with arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last dispatched frame that carried one.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnect delay most recently requested by the server.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Buffers `chunk` and returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            // A complete field line followed by EOF still counts.
            let _ = self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let id = self.id.take();
        if id.is_some() {
            self.last_event_id = id.clone();
        }
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseFrame {
            event: event.filter(|name| !name.is_empty()),
            data,
            id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event type {0:?}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {message}")]
    Malformed { event: String, message: String },
}

/// Decodes a frame's payload according to its event name.
///
/// Frames without a name (or named `message`) carry their type in a `type`
/// field of the payload.
pub fn decode_event(name: Option<&str>, data: &str) -> Result<StreamEvent, DecodeError> {
    let payload = parse_payload(data);
    let name = match name {
        Some(name) if name != "message" => name.to_string(),
        _ => payload
            .as_ref()
            .ok()
            .and_then(|value| value.get("type"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| DecodeError::UnknownEvent(name.unwrap_or("message").to_string()))?,
    };
    let event = name.as_str();

    // Failure events may carry a bare text message.
    if matches!(event, "error" | "job_failed") {
        let message = match &payload {
            Ok(value) => error_message(value),
            Err(_) => data.trim().to_string(),
        };
        return Ok(StreamEvent::Done {
            content: None,
            error: Some(if message.is_empty() {
                "unknown error".to_string()
            } else {
                message
            }),
        });
    }

    let payload = payload.map_err(|message| DecodeError::Malformed {
        event: name.clone(),
        message,
    })?;

    let decoded = match event {
        "connected" => {
            let wire: ConnectedWire = from_value(event, payload)?;
            StreamEvent::Connected {
                message: wire.message,
            }
        }
        "log" => {
            let wire: LogWire = from_value(event, payload)?;
            StreamEvent::Log {
                message: wire.message,
            }
        }
        "agent_activity" | "agent_working" => {
            let wire: AgentWire = from_value(event, payload)?;
            StreamEvent::AgentActivity {
                agent: wire.agent,
                action: wire.action,
                description: wire.description,
                status: wire.status.unwrap_or_else(|| "running".to_string()),
                progress: wire.progress.map(clamp_percent),
            }
        }
        "reasoning_chunk" => {
            let wire: ChunkWire = from_value(event, payload)?;
            let (chunk, accumulated) = wire.into_pair();
            StreamEvent::ReasoningDelta { chunk, accumulated }
        }
        "response_chunk" | "content" => {
            let wire: ChunkWire = from_value(event, payload)?;
            let (chunk, accumulated) = wire.into_pair();
            StreamEvent::ResponseDelta { chunk, accumulated }
        }
        "tool_start" => {
            let wire: ToolStartWire = from_value(event, payload)?;
            StreamEvent::ToolStarted {
                tool: wire.tool,
                input: wire.input,
            }
        }
        "tool_complete" => {
            let wire: ToolCompleteWire = from_value(event, payload)?;
            StreamEvent::ToolCompleted {
                tool: wire.tool,
                output: wire.output,
                success: wire.success,
            }
        }
        "step_start" | "stage_start" => {
            let wire: StepWire = from_value(event, payload)?;
            StreamEvent::StepStarted {
                label: wire.label.unwrap_or_else(|| wire.step_id.clone()),
                step_id: wire.step_id,
            }
        }
        "step_complete" | "stage_complete" => {
            let wire: StepWire = from_value(event, payload)?;
            StreamEvent::StepCompleted {
                label: wire.label.unwrap_or_default(),
                step_id: wire.step_id,
                status: wire.status.unwrap_or_else(|| "completed".to_string()),
            }
        }
        "file_created" | "file_updated" => {
            let wire: FileWire = from_value(event, payload)?;
            StreamEvent::FileChanged {
                path: wire.path,
                change: if event == "file_created" {
                    FileChange::Created
                } else {
                    FileChange::Updated
                },
                content: wire.content,
            }
        }
        "search_results" => {
            let wire: SearchWire = from_value(event, payload)?;
            StreamEvent::SearchResults {
                query: wire.query,
                results: wire.results,
            }
        }
        "browser_update" => {
            let wire: BrowserWire = from_value(event, payload)?;
            StreamEvent::BrowserView {
                url: wire.url,
                title: wire.title,
                screenshot: wire.screenshot,
            }
        }
        "image_generated" => {
            let wire: ImageWire = from_value(event, payload)?;
            StreamEvent::ImageGenerated {
                path: wire.path,
                prompt: wire.prompt,
            }
        }
        "sources_updated" => {
            let wire: SourcesWire = from_value(event, payload)?;
            StreamEvent::SourcesChanged { count: wire.count }
        }
        "done" => {
            let wire: DoneWire = from_value(event, payload)?;
            StreamEvent::Done {
                content: wire.content.or(wire.response),
                error: wire.error.filter(|error| !error.trim().is_empty()),
            }
        }
        other => return Err(DecodeError::UnknownEvent(other.to_string())),
    };
    Ok(decoded)
}

/// Empty payloads decode as an empty object.
fn parse_payload(data: &str) -> Result<Value, String> {
    if data.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(data).map_err(|err| err.to_string())
}

fn from_value<T: DeserializeOwned>(event: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|err| DecodeError::Malformed {
        event: event.to_string(),
        message: err.to_string(),
    })
}

fn error_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => ["error", "message", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn clamp_percent(raw: f64) -> u8 {
    // Some agents report a fraction instead of a percentage. A whole `1`
    // is read as 1%.
    let percent = if raw > 0.0 && raw < 1.0 { raw * 100.0 } else { raw };
    percent.round().clamp(0.0, 100.0) as u8
}

#[derive(Deserialize)]
struct ConnectedWire {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct LogWire {
    message: String,
}

#[derive(Deserialize)]
struct AgentWire {
    #[serde(alias = "agent_name")]
    agent: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
}

/// Backends name the delta `chunk`, `content` or `delta`, sometimes sending
/// several at once, so these are separate fields rather than aliases.
#[derive(Deserialize)]
struct ChunkWire {
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    accumulated: Option<String>,
}

impl ChunkWire {
    fn into_pair(self) -> (String, String) {
        let chunk = self
            .chunk
            .or(self.content)
            .or(self.delta)
            .unwrap_or_default();
        let accumulated = self.accumulated.unwrap_or_else(|| chunk.clone());
        (chunk, accumulated)
    }
}

#[derive(Deserialize)]
struct ToolStartWire {
    #[serde(alias = "name", alias = "tool_name")]
    tool: String,
    #[serde(default, alias = "args", alias = "arguments")]
    input: Option<Value>,
}

#[derive(Deserialize)]
struct ToolCompleteWire {
    #[serde(alias = "name", alias = "tool_name")]
    tool: String,
    #[serde(default, alias = "result")]
    output: Option<Value>,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

#[derive(Deserialize)]
struct StepWire {
    #[serde(alias = "id", alias = "stage", alias = "step")]
    step_id: String,
    #[serde(default, alias = "name", alias = "title")]
    label: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct FileWire {
    #[serde(alias = "file_path", alias = "filename")]
    path: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct SearchWire {
    #[serde(default)]
    query: String,
    #[serde(default)]
    results: Value,
}

#[derive(Deserialize)]
struct BrowserWire {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    screenshot: Option<String>,
}

#[derive(Deserialize)]
struct ImageWire {
    #[serde(alias = "image_path", alias = "url")]
    path: String,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize)]
struct SourcesWire {
    #[serde(default, alias = "total")]
    count: u64,
}

#[derive(Deserialize)]
struct DoneWire {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
