pub type JobId = String;
pub type WorkspaceId = String;
pub type SessionId = String;
pub type MessageId = String;
pub type TabId = String;
pub type RequestId = u64;

/// One backend-initiated long-running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: JobId,
    /// `None` for jobs persisted before workspaces were tracked; those are
    /// resumed in whichever workspace is current.
    pub workspace_id: Option<WorkspaceId>,
    pub session_id: SessionId,
    /// Opaque job kind supplied by the caller (e.g. a template name).
    pub kind: String,
    pub response_message_id: MessageId,
    pub started_at_ms: i64,
}

impl Job {
    pub fn belongs_to(&self, workspace_id: &str) -> bool {
        self.workspace_id
            .as_deref()
            .map_or(true, |owner| owner == workspace_id)
    }
}

/// Lifecycle of a job's connection inside the client.
///
/// `Pending -> Streaming -> Finalizing -> Closed`, with `Disconnected`
/// entered when the transport gives up before a terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Pending,
    Streaming,
    Finalizing,
    Disconnected,
    Closed,
}

impl JobPhase {
    /// A connection is open or being opened for this job.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            JobPhase::Pending | JobPhase::Streaming | JobPhase::Finalizing
        )
    }

    /// Events may still be applied to the job's projections.
    pub fn accepts_events(self) -> bool {
        matches!(self, JobPhase::Pending | JobPhase::Streaming)
    }

    pub fn on_event(self) -> Self {
        match self {
            JobPhase::Pending | JobPhase::Streaming => JobPhase::Streaming,
            other => other,
        }
    }

    pub fn on_terminal(self) -> Option<Self> {
        match self {
            JobPhase::Pending | JobPhase::Streaming | JobPhase::Disconnected => {
                Some(JobPhase::Finalizing)
            }
            JobPhase::Finalizing | JobPhase::Closed => None,
        }
    }

    pub fn on_transport_closed(self) -> Self {
        match self {
            JobPhase::Pending | JobPhase::Streaming => JobPhase::Disconnected,
            other => other,
        }
    }

    pub fn on_resume(self) -> Option<Self> {
        match self {
            JobPhase::Disconnected => Some(JobPhase::Pending),
            _ => None,
        }
    }
}

/// Per-job runtime bookkeeping that is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRuntime {
    pub phase: JobPhase,
    /// Live status line; cleared on finalize.
    pub status: Option<String>,
    /// Advisory percentage reported by activity events.
    pub progress: Option<u8>,
}
