//! Workspace core: pure job/stream orchestration state machine.
//!
//! Keeps three projections of streamed job events (transcript, tabs and
//! progress) plus the active-job registry. All IO is expressed as
//! [`Effect`]s for the platform layer to run.
mod dispatch;
mod effect;
mod event;
mod job;
mod msg;
mod progress;
mod registry;
mod state;
mod tabs;
mod transcript;
mod update;
mod view_model;

pub use effect::{ChatSubmission, Effect, Notification};
pub use event::{ConnectionState, FileChange, StreamEvent};
pub use job::{Job, JobId, JobPhase, JobRuntime, MessageId, RequestId, SessionId, TabId, WorkspaceId};
pub use msg::{ChatOutcome, Msg, RestoreSnapshot};
pub use progress::{
    is_noise, normalize_step_status, AgentActivity, ProgressBoard, ProgressStep, StepStatus,
    TimelineEntry, ACTIVITY_HISTORY_LIMIT, TIMELINE_LIMIT,
};
pub use registry::JobRegistry;
pub use state::{AppState, CoreConfig, DEFAULT_WORKSPACE};
pub use tabs::{
    agent_identity, agent_title, browser_identity, data_identity, file_identity, image_identity,
    is_completion_status, normalize_url, normalize_workspace_path, sources_identity, Tab,
    TabChange, TabKind, TabPolicy, TabSet,
};
pub use transcript::{HistoryEntry, Message, MessageSnapshot, Role, Transcript, VariantSet};
pub use update::update;
pub use view_model::{
    ActivityView, AppViewModel, JobView, MessageView, StepView, TabView, TimelineView,
};
