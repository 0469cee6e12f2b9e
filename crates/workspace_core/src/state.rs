use std::collections::BTreeMap;

use crate::view_model::{
    ActivityView, AppViewModel, JobView, MessageView, StepView, TabView, TimelineView,
};
use crate::{
    JobId, JobPhase, JobRegistry, JobRuntime, MessageId, ProgressBoard, RequestId, SessionId,
    TabPolicy, TabSet, Transcript, WorkspaceId,
};

/// Timeline lines included in the view model.
const VIEW_TIMELINE_LINES: usize = 20;

pub const DEFAULT_WORKSPACE: &str = "default";

/// Tunables for the pure core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreConfig {
    pub tab_policy: TabPolicy,
}

/// A chat submission awaiting the endpoint's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRequest {
    pub kind: Option<String>,
    /// Message being regenerated and its content before regeneration.
    pub regenerate: Option<(MessageId, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub(crate) config: CoreConfig,
    pub(crate) workspace_id: WorkspaceId,
    pub(crate) session_id: SessionId,
    pub(crate) registry: JobRegistry,
    pub(crate) runtimes: BTreeMap<JobId, JobRuntime>,
    pub(crate) transcript: Transcript,
    pub(crate) tabs: TabSet,
    pub(crate) progress: ProgressBoard,
    pub(crate) pending: BTreeMap<RequestId, PendingRequest>,
    /// Regenerations waiting for their job's terminal event, by message id.
    pub(crate) regenerations: BTreeMap<MessageId, String>,
    pub(crate) next_request_id: RequestId,
    pub(crate) current_job: Option<JobId>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_config(CoreConfig::default())
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            config,
            workspace_id: DEFAULT_WORKSPACE.to_string(),
            session_id: DEFAULT_WORKSPACE.to_string(),
            registry: JobRegistry::new(),
            runtimes: BTreeMap::new(),
            transcript: Transcript::new(),
            tabs: TabSet::new(),
            progress: ProgressBoard::new(),
            pending: BTreeMap::new(),
            regenerations: BTreeMap::new(),
            next_request_id: 0,
            current_job: None,
            dirty: false,
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tabs(&self) -> &TabSet {
        &self.tabs
    }

    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    pub fn current_job(&self) -> Option<&str> {
        self.current_job.as_deref()
    }

    pub fn job_phase(&self, job_id: &str) -> JobPhase {
        self.runtimes
            .get(job_id)
            .map(|runtime| runtime.phase)
            .unwrap_or(JobPhase::Closed)
    }

    pub fn is_processing(&self) -> bool {
        self.registry.is_processing(&self.workspace_id)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether a render is due and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn next_request_id(&mut self) -> RequestId {
        self.next_request_id += 1;
        self.next_request_id
    }

    pub fn view(&self) -> AppViewModel {
        let transcript = &self.transcript;
        let messages = transcript
            .messages()
            .iter()
            .map(|message| {
                let variants = transcript.variants(&message.id);
                MessageView {
                    id: message.id.clone(),
                    role: message.role,
                    content: transcript.displayed_content(message).to_string(),
                    is_streaming: message.is_streaming,
                    is_error: message.is_error,
                    agent: message.agent.clone(),
                    variant_count: variants.map_or(0, |set| set.contents.len()),
                    selected_variant: variants.map_or(0, |set| set.selected),
                }
            })
            .collect();

        let tabs = self
            .tabs
            .tabs()
            .iter()
            .filter(|tab| tab.workspace_id == self.workspace_id)
            .map(|tab| TabView {
                id: tab.id.clone(),
                kind: tab.kind,
                title: tab.title.clone(),
                status: tab.status().map(ToOwned::to_owned),
                is_active: self.tabs.active() == Some(tab.id.as_str()),
            })
            .collect();

        let jobs = self
            .registry
            .jobs()
            .filter(|job| job.belongs_to(&self.workspace_id))
            .map(|job| {
                let runtime = self.runtimes.get(&job.job_id).cloned().unwrap_or_default();
                JobView {
                    job_id: job.job_id.clone(),
                    kind: job.kind.clone(),
                    phase: runtime.phase,
                    status: runtime.status,
                    progress: runtime.progress,
                }
            })
            .collect();

        let steps = self
            .progress
            .all_steps()
            .map(|(job_id, step)| StepView {
                job_id: job_id.clone(),
                id: step.id.clone(),
                label: step.label.clone(),
                status: step.status,
            })
            .collect();

        let activities = self
            .progress
            .live_activities()
            .map(|activity| ActivityView {
                agent: activity.agent.clone(),
                job_id: activity.job_id.clone(),
                action: activity.action.clone(),
                progress: activity.progress,
            })
            .collect();

        let timeline: Vec<TimelineView> = self
            .progress
            .timeline()
            .map(|entry| TimelineView {
                job_id: entry.job_id.clone(),
                message: entry.message.clone(),
            })
            .collect();
        let skip = timeline.len().saturating_sub(VIEW_TIMELINE_LINES);

        AppViewModel {
            workspace_id: self.workspace_id.clone(),
            processing: self.is_processing(),
            messages,
            tabs,
            active_tab: self.tabs.active().map(ToOwned::to_owned),
            panel_open: self.tabs.is_panel_open(),
            jobs,
            steps,
            activities,
            timeline: timeline.into_iter().skip(skip).collect(),
            dirty: self.dirty,
        }
    }
}
