//! Routes decoded stream events and connection changes into the transcript,
//! tab and progress projections, and finalizes jobs on terminal events.

use serde_json::json;
use workspace_logging::{with_job_tag, ws_debug, ws_info, ws_warn};

use crate::progress::{normalize_step_status, AgentActivity, StepStatus};
use crate::tabs::{
    agent_identity, agent_title, browser_identity, data_identity, file_identity, image_identity,
    sources_identity, TabKind,
};
use crate::{
    AppState, ConnectionState, Effect, FileChange, Job, JobPhase, JobRuntime, Notification,
    StreamEvent,
};

pub(crate) fn apply_stream_event(
    state: &mut AppState,
    job_id: &str,
    event: StreamEvent,
    at_ms: i64,
) -> Vec<Effect> {
    with_job_tag(job_id, || {
        let phase = state.job_phase(job_id);
        if !phase.accepts_events() {
            ws_debug!("dropping {} event in phase {:?}", event.label(), phase);
            return Vec::new();
        }
        let Some(job) = state.registry.get(job_id).cloned() else {
            ws_warn!("event {} for unregistered job", event.label());
            return Vec::new();
        };
        let runtime = state.runtimes.entry(job_id.to_string()).or_default();
        runtime.phase = runtime.phase.on_event();
        state.mark_dirty();
        route(state, &job, event, at_ms)
    })
}

fn route(state: &mut AppState, job: &Job, event: StreamEvent, at_ms: i64) -> Vec<Effect> {
    let job_id = job.job_id.as_str();
    let workspace_id = job
        .workspace_id
        .clone()
        .unwrap_or_else(|| state.workspace_id.clone());
    let response_id = job.response_message_id.as_str();

    match event {
        StreamEvent::Connected { message } => {
            set_status(state, job_id, message.unwrap_or_else(|| "Connected".to_string()));
            Vec::new()
        }
        StreamEvent::Log { message } => {
            state.progress.record_log(job_id, &message, at_ms);
            set_status(state, job_id, message.trim().to_string());
            Vec::new()
        }
        StreamEvent::AgentActivity {
            agent,
            action,
            description,
            status,
            progress,
        } => {
            let progress = progress.map(|pct| pct.min(100));
            state.progress.record_activity(AgentActivity {
                agent: agent.clone(),
                job_id: job_id.to_string(),
                action: action.clone(),
                description: description.clone(),
                status: status.clone(),
                progress,
            });
            if let Some(runtime) = state.runtimes.get_mut(job_id) {
                runtime.progress = progress.or(runtime.progress);
            }
            let line = if description.is_empty() {
                format!("{agent}: {action}")
            } else {
                format!("{agent}: {description}")
            };
            set_status(state, job_id, line);
            state.transcript.set_agent(response_id, &agent);

            let tab_id = agent_identity(&agent, job_id);
            state.tabs.open_or_update(
                TabKind::Agent,
                tab_id.clone(),
                &agent_title(&agent),
                json!({
                    "agent": agent,
                    "action": action,
                    "description": description,
                    "status": status,
                    "progress": progress,
                    "job_id": job_id,
                }),
                &workspace_id,
                Some(job_id),
                false,
            );
            schedule_auto_close_if_done(state, &tab_id)
        }
        StreamEvent::ReasoningDelta { accumulated, .. } => {
            state
                .transcript
                .apply_reasoning(response_id, &accumulated, Some(job_id));
            Vec::new()
        }
        StreamEvent::ResponseDelta { accumulated, .. } => {
            state
                .transcript
                .apply_delta(response_id, &accumulated, Some(job_id));
            Vec::new()
        }
        StreamEvent::ToolStarted { tool, .. } => {
            state.progress.upsert_step(
                job_id,
                &format!("tool:{tool}"),
                &format!("Using {tool}"),
                StepStatus::Running,
                at_ms,
            );
            Vec::new()
        }
        StreamEvent::ToolCompleted { tool, success, .. } => {
            let status = if success {
                StepStatus::Completed
            } else {
                StepStatus::Error
            };
            state
                .progress
                .upsert_step(job_id, &format!("tool:{tool}"), "", status, at_ms);
            Vec::new()
        }
        StreamEvent::StepStarted { step_id, label } => {
            state
                .progress
                .upsert_step(job_id, &step_id, &label, StepStatus::Running, at_ms);
            Vec::new()
        }
        StreamEvent::StepCompleted {
            step_id,
            label,
            status,
        } => {
            state.progress.upsert_step(
                job_id,
                &step_id,
                &label,
                normalize_step_status(&status),
                at_ms,
            );
            Vec::new()
        }
        StreamEvent::FileChanged {
            path,
            change,
            content,
        } => {
            let title = path
                .rsplit(['/', '\\'])
                .find(|segment| !segment.is_empty())
                .unwrap_or(path.as_str())
                .to_string();
            let change_label = match change {
                FileChange::Created => "created",
                FileChange::Updated => "updated",
            };
            let mut data = json!({
                "path": path.clone(),
                "change": change_label,
                "job_id": job_id,
            });
            if let Some(content) = content {
                data["content"] = json!(content);
            }
            state.tabs.open_or_update(
                TabKind::File,
                file_identity(&path),
                &title,
                data,
                &workspace_id,
                Some(job_id),
                change == FileChange::Created,
            );
            vec![Effect::Notify(Notification::WorkspaceRefresh {
                workspace_id,
                path,
            })]
        }
        StreamEvent::SearchResults { query, results } => {
            let data = json!({ "query": query.clone(), "results": results });
            let tab_id = data_identity(TabKind::Search, &data);
            state.tabs.open_or_update(
                TabKind::Search,
                tab_id,
                &format!("Search: {query}"),
                data,
                &workspace_id,
                Some(job_id),
                true,
            );
            Vec::new()
        }
        StreamEvent::BrowserView {
            url,
            title,
            screenshot,
        } => {
            let title = title.unwrap_or_else(|| url.clone());
            let mut data = json!({ "url": url.clone(), "title": title.clone() });
            if let Some(screenshot) = screenshot {
                data["screenshot"] = json!(screenshot);
            }
            state.tabs.open_or_update(
                TabKind::Browser,
                browser_identity(&url),
                &title,
                data,
                &workspace_id,
                Some(job_id),
                false,
            );
            Vec::new()
        }
        StreamEvent::ImageGenerated { path, prompt } => {
            let title = prompt.clone().unwrap_or_else(|| path.clone());
            state.tabs.open_or_update(
                TabKind::Image,
                image_identity(&path),
                &title,
                json!({ "path": path, "prompt": prompt }),
                &workspace_id,
                Some(job_id),
                true,
            );
            Vec::new()
        }
        StreamEvent::SourcesChanged { count } => {
            state.tabs.open_or_update(
                TabKind::Sources,
                sources_identity(&workspace_id),
                "Sources",
                json!({ "count": count }),
                &workspace_id,
                None,
                false,
            );
            vec![Effect::Notify(Notification::SourcesChanged {
                workspace_id,
                count,
            })]
        }
        StreamEvent::Done { content, error } => {
            if let Some(content) = content.filter(|c| !c.is_empty()) {
                state
                    .transcript
                    .apply_delta(response_id, &content, Some(job_id));
            }
            finalize(state, job_id, true, error)
        }
    }
}

fn set_status(state: &mut AppState, job_id: &str, status: String) {
    if status.is_empty() {
        return;
    }
    if let Some(runtime) = state.runtimes.get_mut(job_id) {
        runtime.status = Some(status);
    }
}

fn schedule_auto_close_if_done(state: &AppState, tab_id: &str) -> Vec<Effect> {
    let policy = &state.config.tab_policy;
    match state.tabs.get(tab_id) {
        Some(tab) if policy.should_auto_close(tab) => vec![Effect::ScheduleAutoClose {
            tab_id: tab_id.to_string(),
            delay_ms: policy.auto_close_delay_ms,
        }],
        _ => Vec::new(),
    }
}

/// Ends a job: freezes its response, optionally commits it, resolves a
/// pending regeneration, clears ambient status and unregisters it.
///
/// Calling this for a job that is already finalizing or closed is a no-op.
pub(crate) fn finalize(
    state: &mut AppState,
    job_id: &str,
    should_persist: bool,
    error: Option<String>,
) -> Vec<Effect> {
    let registered = state.registry.contains(job_id);
    let phase = state.runtimes.get(job_id).map(|runtime| runtime.phase);
    let can_finalize = match phase {
        Some(phase) => phase.on_terminal().is_some(),
        None => registered,
    };
    if !can_finalize {
        ws_debug!("finalize ignored for job {} in phase {:?}", job_id, phase);
        return Vec::new();
    }
    state.runtimes.entry(job_id.to_string()).or_default().phase = JobPhase::Finalizing;
    state.mark_dirty();

    let mut effects = Vec::new();
    if let Some(job) = state.registry.get(job_id).cloned() {
        let response_id = job.response_message_id.as_str();
        let content = state
            .transcript
            .finalize(response_id)
            .map(|message| message.content.clone())
            .unwrap_or_default();

        if should_persist && !content.trim().is_empty() {
            effects.push(Effect::CommitMessage {
                session_id: job.session_id.clone(),
                role: crate::Role::Assistant,
                content: content.clone(),
                job_id: Some(job_id.to_string()),
            });
        }

        if let Some(previous) = state.regenerations.remove(response_id) {
            if error.is_some() || content.trim().is_empty() {
                state.transcript.cancel_regeneration(response_id, &previous);
            } else {
                state.transcript.append_variant(response_id, &content);
            }
        }

        if let Some(error) = &error {
            ws_warn!("job {} failed: {}", job_id, error);
            state.transcript.remove_if_empty(response_id);
            state
                .transcript
                .push_error(&format!("Job failed: {error}"), Some(job_id));
        } else {
            ws_info!("job {} finished ({} chars)", job_id, content.len());
        }
    }

    state.progress.clear_job_activity(job_id);
    effects.extend(state.registry.unregister(job_id));
    state.runtimes.insert(
        job_id.to_string(),
        JobRuntime {
            phase: JobPhase::Closed,
            status: None,
            progress: None,
        },
    );
    if state.current_job.as_deref() == Some(job_id) {
        state.current_job = None;
    }
    effects.push(Effect::PersistMessages {
        workspace_id: state.workspace_id.clone(),
        messages: state.transcript.snapshot(),
    });
    effects
}

pub(crate) fn apply_connection_state(
    state: &mut AppState,
    job_id: &str,
    connection: ConnectionState,
) -> Vec<Effect> {
    let Some(runtime) = state.runtimes.get_mut(job_id) else {
        return Vec::new();
    };
    if !runtime.phase.is_live() {
        return Vec::new();
    }
    let mut effects = Vec::new();
    match connection {
        ConnectionState::Connected => {
            runtime.phase = runtime.phase.on_event();
            runtime.status = Some("Connected".to_string());
        }
        ConnectionState::Reconnecting { attempt, reason } => {
            ws_debug!("job {} reconnecting (attempt {}): {}", job_id, attempt, reason);
            runtime.status = Some(format!("Reconnecting (attempt {attempt})..."));
        }
        ConnectionState::Closed { reason } => {
            if runtime.phase == JobPhase::Finalizing {
                return Vec::new();
            }
            ws_warn!("job {} lost its connection: {}", job_id, reason);
            runtime.phase = runtime.phase.on_transport_closed();
            runtime.status = Some("Connection lost".to_string());
            if let Some(job) = state.registry.get(job_id) {
                let response_id = job.response_message_id.clone();
                state.transcript.finalize(&response_id);
            }
            effects.push(Effect::Notify(Notification::ConnectionLost {
                job_id: job_id.to_string(),
            }));
        }
    }
    state.mark_dirty();
    effects
}
