use serde_json::Value;

/// Typed stream event, decoded once from a named server-push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected {
        message: Option<String>,
    },
    Log {
        message: String,
    },
    AgentActivity {
        agent: String,
        action: String,
        description: String,
        status: String,
        progress: Option<u8>,
    },
    ReasoningDelta {
        chunk: String,
        accumulated: String,
    },
    /// `accumulated` is authoritative: it carries the full response so far.
    ResponseDelta {
        chunk: String,
        accumulated: String,
    },
    ToolStarted {
        tool: String,
        input: Option<Value>,
    },
    ToolCompleted {
        tool: String,
        output: Option<Value>,
        success: bool,
    },
    StepStarted {
        step_id: String,
        label: String,
    },
    StepCompleted {
        step_id: String,
        label: String,
        status: String,
    },
    FileChanged {
        path: String,
        change: FileChange,
        content: Option<String>,
    },
    SearchResults {
        query: String,
        results: Value,
    },
    BrowserView {
        url: String,
        title: Option<String>,
        screenshot: Option<String>,
    },
    ImageGenerated {
        path: String,
        prompt: Option<String>,
    },
    SourcesChanged {
        count: u64,
    },
    /// Terminal event. `error` is set when the backend reports failure.
    Done {
        content: Option<String>,
        error: Option<String>,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }

    /// Short name used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Log { .. } => "log",
            StreamEvent::AgentActivity { .. } => "agent_activity",
            StreamEvent::ReasoningDelta { .. } => "reasoning_chunk",
            StreamEvent::ResponseDelta { .. } => "response_chunk",
            StreamEvent::ToolStarted { .. } => "tool_start",
            StreamEvent::ToolCompleted { .. } => "tool_complete",
            StreamEvent::StepStarted { .. } => "step_start",
            StreamEvent::StepCompleted { .. } => "step_complete",
            StreamEvent::FileChanged { .. } => "file_changed",
            StreamEvent::SearchResults { .. } => "search_results",
            StreamEvent::BrowserView { .. } => "browser_update",
            StreamEvent::ImageGenerated { .. } => "image_generated",
            StreamEvent::SourcesChanged { .. } => "sources_updated",
            StreamEvent::Done { .. } => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Created,
    Updated,
}

/// Transport-level state reported by a job's connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32, reason: String },
    /// The transport gave up; no further events will arrive.
    Closed { reason: String },
}
