use crate::{HistoryEntry, Job, JobId, MessageId, MessageSnapshot, RequestId, Role, SessionId, TabId, WorkspaceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a user message (with context) to the chat endpoint.
    SubmitChat(ChatSubmission),
    /// Open the push connection for a job. The engine ignores duplicates.
    OpenStream { job: Job },
    CloseStream { job_id: JobId },
    /// Mirror the full active-job set to client storage.
    PersistJobs(Vec<Job>),
    /// Mirror the workspace transcript to client storage.
    PersistMessages {
        workspace_id: WorkspaceId,
        messages: Vec<MessageSnapshot>,
    },
    /// Append a finalized message to the external conversation store.
    CommitMessage {
        session_id: SessionId,
        role: Role,
        content: String,
        job_id: Option<JobId>,
    },
    ScheduleAutoClose { tab_id: TabId, delay_ms: u64 },
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSubmission {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub workspace_id: WorkspaceId,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub kind: Option<String>,
    /// Assistant message being regenerated, if any.
    pub regenerate: Option<MessageId>,
}

/// Typed cross-component signals for the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A file in the workspace was created or updated.
    WorkspaceRefresh {
        workspace_id: WorkspaceId,
        path: String,
    },
    SourcesChanged {
        workspace_id: WorkspaceId,
        count: u64,
    },
    ProcessingChanged {
        workspace_id: WorkspaceId,
        processing: bool,
    },
    /// A job's transport closed before a terminal event.
    ConnectionLost { job_id: JobId },
}
