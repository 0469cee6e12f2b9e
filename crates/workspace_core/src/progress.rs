//! Step timeline, agent activity and live status per job.

use std::collections::{BTreeMap, VecDeque};

use workspace_logging::ws_debug;

use crate::JobId;

pub const ACTIVITY_HISTORY_LIMIT: usize = 50;
pub const TIMELINE_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }
}

/// Maps the backend's open-ended status vocabulary onto [`StepStatus`].
pub fn normalize_step_status(raw: &str) -> StepStatus {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "done" | "complete" | "completed" | "success" | "succeeded" | "finished" | "ok" => {
            StepStatus::Completed
        }
        "running" | "started" | "start" | "in_progress" | "active" | "working" | "processing" => {
            StepStatus::Running
        }
        "error" | "failed" | "failure" | "fail" | "cancelled" | "canceled" => StepStatus::Error,
        _ => StepStatus::Pending,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStep {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentActivity {
    pub agent: String,
    pub job_id: JobId,
    pub action: String,
    pub description: String,
    pub status: String,
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub job_id: JobId,
    pub message: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressBoard {
    steps: BTreeMap<JobId, Vec<ProgressStep>>,
    live: BTreeMap<(JobId, String), AgentActivity>,
    history: VecDeque<AgentActivity>,
    timeline: VecDeque<TimelineEntry>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self, job_id: &str) -> &[ProgressStep] {
        self.steps.get(job_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_steps(&self) -> impl Iterator<Item = (&JobId, &ProgressStep)> {
        self.steps
            .iter()
            .flat_map(|(job_id, steps)| steps.iter().map(move |step| (job_id, step)))
    }

    /// Inserts or updates a step. Terminal steps keep their status; a later
    /// lower status only refreshes the label.
    pub fn upsert_step(
        &mut self,
        job_id: &str,
        step_id: &str,
        label: &str,
        status: StepStatus,
        timestamp_ms: i64,
    ) {
        let steps = self.steps.entry(job_id.to_string()).or_default();
        match steps.iter_mut().find(|step| step.id == step_id) {
            Some(step) => {
                if !label.is_empty() {
                    step.label = label.to_string();
                }
                if step.status.is_terminal() && status != step.status {
                    ws_debug!(
                        "step {} is {:?}; ignoring transition to {:?}",
                        step_id,
                        step.status,
                        status
                    );
                    return;
                }
                step.status = status;
                step.timestamp_ms = timestamp_ms;
            }
            None => steps.push(ProgressStep {
                id: step_id.to_string(),
                label: if label.is_empty() {
                    step_id.to_string()
                } else {
                    label.to_string()
                },
                status,
                timestamp_ms,
            }),
        }
    }

    pub fn record_activity(&mut self, activity: AgentActivity) {
        self.live.insert(
            (activity.job_id.clone(), activity.agent.clone()),
            activity.clone(),
        );
        self.history.push_back(activity);
        while self.history.len() > ACTIVITY_HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn live_activities(&self) -> impl Iterator<Item = &AgentActivity> {
        self.live.values()
    }

    pub fn activity(&self, job_id: &str, agent: &str) -> Option<&AgentActivity> {
        self.live.get(&(job_id.to_string(), agent.to_string()))
    }

    pub fn history(&self) -> impl Iterator<Item = &AgentActivity> {
        self.history.iter()
    }

    /// Drops live activity for a finished job. Steps and history stay.
    pub fn clear_job_activity(&mut self, job_id: &str) {
        self.live.retain(|(owner, _), _| owner != job_id);
    }

    /// Appends a log line to the timeline unless it is noise.
    ///
    /// Returns `true` if the line was kept.
    pub fn record_log(&mut self, job_id: &str, message: &str, timestamp_ms: i64) -> bool {
        if is_noise(message) {
            return false;
        }
        self.timeline.push_back(TimelineEntry {
            job_id: job_id.to_string(),
            message: message.trim().to_string(),
            timestamp_ms,
        });
        while self.timeline.len() > TIMELINE_LIMIT {
            self.timeline.pop_front();
        }
        true
    }

    pub fn timeline(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.timeline.iter()
    }
}

const NOISE_WORDS: &[&str] = &[
    "processing",
    "thinking",
    "working",
    "loading",
    "please wait",
    "in progress",
];

/// Short, numeric-only or generic "busy" lines.
pub fn is_noise(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.chars().count() < 4 {
        return true;
    }
    let without_dots = trimmed.trim_end_matches(['.', '…']).trim();
    if without_dots.is_empty() {
        return true;
    }
    let numeric = without_dots.trim_end_matches('%').trim();
    if !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return true;
    }
    let lowered = without_dots.to_ascii_lowercase();
    NOISE_WORDS.contains(&lowered.as_str())
}
