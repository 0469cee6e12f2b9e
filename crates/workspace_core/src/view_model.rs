use crate::{JobId, JobPhase, MessageId, Role, StepStatus, TabId, TabKind, WorkspaceId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub workspace_id: WorkspaceId,
    pub processing: bool,
    pub messages: Vec<MessageView>,
    pub tabs: Vec<TabView>,
    pub active_tab: Option<TabId>,
    pub panel_open: bool,
    pub jobs: Vec<JobView>,
    pub steps: Vec<StepView>,
    pub activities: Vec<ActivityView>,
    pub timeline: Vec<TimelineView>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
    pub is_error: bool,
    pub agent: Option<String>,
    pub variant_count: usize,
    pub selected_variant: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabView {
    pub id: TabId,
    pub kind: TabKind,
    pub title: String,
    pub status: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub job_id: JobId,
    pub kind: String,
    pub phase: JobPhase,
    pub status: Option<String>,
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepView {
    pub job_id: JobId,
    pub id: String,
    pub label: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityView {
    pub agent: String,
    pub job_id: JobId,
    pub action: String,
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineView {
    pub job_id: JobId,
    pub message: String,
}
