use std::collections::BTreeMap;

use workspace_logging::{ws_debug, ws_info};

use crate::{Effect, Job, JobId, Notification, WorkspaceId};

/// Durable record of the active jobs across workspaces.
///
/// Every mutation returns the effects that mirror it to client storage, and
/// re-derives the per-workspace processing flags from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<JobId, Job>,
    processing: BTreeMap<WorkspaceId, bool>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Job) -> Vec<Effect> {
        ws_info!(
            "register job_id={} kind={} workspace={:?}",
            job.job_id,
            job.kind,
            job.workspace_id
        );
        if let Some(workspace_id) = &job.workspace_id {
            self.processing.entry(workspace_id.clone()).or_insert(false);
        }
        self.jobs.insert(job.job_id.clone(), job);
        self.persist_and_rederive()
    }

    /// Removes the job and asks the engine to drop its connection.
    ///
    /// Unknown ids produce no effects.
    pub fn unregister(&mut self, job_id: &str) -> Vec<Effect> {
        if self.jobs.remove(job_id).is_none() {
            ws_debug!("unregister ignored for unknown job_id={}", job_id);
            return Vec::new();
        }
        ws_info!("unregister job_id={}", job_id);
        let mut effects = vec![Effect::CloseStream {
            job_id: job_id.to_string(),
        }];
        effects.extend(self.persist_and_rederive());
        effects
    }

    /// Replaces the in-memory set with a persisted one.
    ///
    /// Returns the jobs that should be reconnected for `current_workspace`.
    /// No persistence effect is emitted since the set came from storage.
    pub fn restore(&mut self, jobs: Vec<Job>, current_workspace: &str) -> (Vec<Job>, Vec<Effect>) {
        self.jobs.clear();
        self.processing
            .entry(current_workspace.to_string())
            .or_insert(false);
        for job in jobs {
            if let Some(workspace_id) = &job.workspace_id {
                self.processing.entry(workspace_id.clone()).or_insert(false);
            }
            self.jobs.insert(job.job_id.clone(), job);
        }
        let resumable = self
            .jobs
            .values()
            .filter(|job| job.belongs_to(current_workspace))
            .cloned()
            .collect();
        (resumable, self.rederive_processing())
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Cached processing flag for `workspace_id`.
    pub fn is_processing(&self, workspace_id: &str) -> bool {
        match self.processing.get(workspace_id) {
            Some(flag) => *flag,
            None => self.has_job_for(workspace_id),
        }
    }

    pub fn has_job_for(&self, workspace_id: &str) -> bool {
        self.jobs.values().any(|job| job.belongs_to(workspace_id))
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.values().cloned().collect()
    }

    fn persist_and_rederive(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::PersistJobs(self.snapshot())];
        effects.extend(self.rederive_processing());
        effects
    }

    /// Recomputes every known workspace's flag; emits a notification for
    /// each flag that changed.
    fn rederive_processing(&mut self) -> Vec<Effect> {
        let workspaces: Vec<WorkspaceId> = self.processing.keys().cloned().collect();
        let mut effects = Vec::new();
        for workspace_id in workspaces {
            let derived = self.has_job_for(&workspace_id);
            let previous = self.processing.insert(workspace_id.clone(), derived);
            if previous != Some(derived) {
                effects.push(Effect::Notify(Notification::ProcessingChanged {
                    workspace_id,
                    processing: derived,
                }));
            }
        }
        effects
    }
}
