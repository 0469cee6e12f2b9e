use crate::{ConnectionState, Job, JobId, MessageId, MessageSnapshot, RequestId, SessionId, StreamEvent, TabId, WorkspaceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Reload persisted client state for a workspace.
    Restore(RestoreSnapshot),
    /// User submitted a chat message.
    SendMessage { text: String, kind: Option<String> },
    /// The chat endpoint answered a submission.
    ChatResolved {
        request_id: RequestId,
        outcome: ChatOutcome,
        at_ms: i64,
    },
    /// The chat request never produced a reply or a job.
    ChatFailed { request_id: RequestId, error: String },
    /// Decoded event from a job's push connection.
    Stream {
        job_id: JobId,
        event: StreamEvent,
        at_ms: i64,
    },
    /// Transport state of a job's push connection.
    Connection { job_id: JobId, state: ConnectionState },
    /// User stopped a job.
    StopJob { job_id: JobId },
    /// User asked to reconnect a job whose connection was lost.
    ResumeJob { job_id: JobId },
    Regenerate { message_id: MessageId },
    EditMessage {
        message_id: MessageId,
        content: String,
        redo: bool,
    },
    SelectVariant { message_id: MessageId, index: usize },
    SelectTab { tab_id: TabId },
    CloseTab { tab_id: TabId },
    /// A scheduled auto-close delay elapsed.
    AutoCloseElapsed { tab_id: TabId },
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Immediate textual reply.
    Reply { content: String },
    /// Long-running job to stream.
    Job { job_id: JobId, kind: String },
}

/// Persisted client state handed to the core on start-up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoreSnapshot {
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    pub jobs: Vec<Job>,
    pub messages: Vec<MessageSnapshot>,
}
