use workspace_logging::{ws_debug, ws_info, ws_warn};

use crate::dispatch::{apply_connection_state, apply_stream_event, finalize};
use crate::state::PendingRequest;
use crate::{
    AppState, ChatOutcome, ChatSubmission, Effect, Job, JobRuntime, Message, Msg, RestoreSnapshot,
    Role,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Restore(snapshot) => restore(&mut state, snapshot),
        Msg::SendMessage { text, kind } => send_message(&mut state, &text, kind),
        Msg::ChatResolved {
            request_id,
            outcome,
            at_ms,
        } => {
            let Some(pending) = state.pending.remove(&request_id) else {
                ws_debug!("chat result for unknown request {}", request_id);
                return (state, Vec::new());
            };
            state.mark_dirty();
            match outcome {
                ChatOutcome::Reply { content } => apply_reply(&mut state, pending, &content),
                ChatOutcome::Job { job_id, kind } => {
                    start_job(&mut state, pending, job_id, kind, at_ms)
                }
            }
        }
        Msg::ChatFailed { request_id, error } => {
            let Some(pending) = state.pending.remove(&request_id) else {
                return (state, Vec::new());
            };
            ws_warn!("chat request {} failed: {}", request_id, error);
            if let Some((message_id, previous)) = &pending.regenerate {
                state.transcript.cancel_regeneration(message_id, previous);
            }
            state
                .transcript
                .push_error(&format!("Request failed: {error}"), None);
            state.mark_dirty();
            vec![persist_messages(&state)]
        }
        Msg::Stream {
            job_id,
            event,
            at_ms,
        } => apply_stream_event(&mut state, &job_id, event, at_ms),
        Msg::Connection {
            job_id,
            state: connection,
        } => apply_connection_state(&mut state, &job_id, connection),
        Msg::StopJob { job_id } => {
            ws_info!("stop requested for job {}", job_id);
            let mut effects = finalize(&mut state, &job_id, false, None);
            if let Some(runtime) = state.runtimes.get_mut(&job_id) {
                runtime.status = Some("Stopped".to_string());
            }
            if effects.is_empty() {
                // Not live any more; make sure no stray connection survives.
                effects.push(Effect::CloseStream { job_id });
            }
            effects
        }
        Msg::ResumeJob { job_id } => resume_job(&mut state, &job_id),
        Msg::Regenerate { message_id } => regenerate(&mut state, &message_id),
        Msg::EditMessage {
            message_id,
            content,
            redo,
        } => edit_message(&mut state, &message_id, &content, redo),
        Msg::SelectVariant { message_id, index } => {
            if state.transcript.select_variant(&message_id, index) {
                state.mark_dirty();
                vec![persist_messages(&state)]
            } else {
                Vec::new()
            }
        }
        Msg::SelectTab { tab_id } => {
            if state.tabs.select(&tab_id) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::CloseTab { tab_id } => {
            if state.tabs.close(&tab_id) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::AutoCloseElapsed { tab_id } => {
            let policy = state.config.tab_policy.clone();
            if state.tabs.auto_close(&tab_id, &policy) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn persist_messages(state: &AppState) -> Effect {
    Effect::PersistMessages {
        workspace_id: state.workspace_id.clone(),
        messages: state.transcript.snapshot(),
    }
}

fn restore(state: &mut AppState, snapshot: RestoreSnapshot) -> Vec<Effect> {
    let RestoreSnapshot {
        workspace_id,
        session_id,
        jobs,
        messages,
    } = snapshot;
    if workspace_id != state.workspace_id {
        state.tabs.clear();
    }
    state.workspace_id = workspace_id;
    state.session_id = session_id;
    state.transcript.restore(messages);
    state
        .regenerations
        .retain(|message_id, _| state.transcript.get(message_id).is_some());

    let (resumable, mut effects) = state.registry.restore(jobs, &state.workspace_id.clone());
    for job in resumable {
        let live = state
            .runtimes
            .get(&job.job_id)
            .is_some_and(|runtime| runtime.phase.is_live());
        if live {
            ws_debug!("job {} already connected; not reopening", job.job_id);
            continue;
        }
        ws_info!("resuming job {} after reload", job.job_id);
        if job.response_message_id != fresh_response_id(&job.job_id) {
            resume_regeneration(state, &job.response_message_id);
        }
        state
            .transcript
            .resume_streaming(&job.response_message_id, &job.job_id);
        state.runtimes.insert(
            job.job_id.clone(),
            JobRuntime {
                status: Some("Resuming...".to_string()),
                ..JobRuntime::default()
            },
        );
        state.current_job = Some(job.job_id.clone());
        effects.push(Effect::OpenStream { job });
    }
    state.mark_dirty();
    effects
}

/// Rebuilds the regeneration marker for a job that was streaming into an
/// existing message when the client went away. Stored text is cleared; the
/// stream replays its accumulated content.
fn resume_regeneration(state: &mut AppState, message_id: &str) {
    let selected = state
        .transcript
        .variants(message_id)
        .and_then(|set| set.contents.get(set.selected))
        .cloned();
    if let Some(content) = state.transcript.begin_regeneration(message_id) {
        state
            .regenerations
            .insert(message_id.to_string(), selected.unwrap_or(content));
    }
}

fn send_message(state: &mut AppState, text: &str, kind: Option<String>) -> Vec<Effect> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let history = state.transcript.history_before(None);
    state.transcript.push_user(text);
    state.mark_dirty();

    let mut effects = vec![Effect::CommitMessage {
        session_id: state.session_id.clone(),
        role: Role::User,
        content: text.to_string(),
        job_id: None,
    }];
    effects.push(submit(state, text, history, kind, None));
    effects.push(persist_messages(state));
    effects
}

fn submit(
    state: &mut AppState,
    text: &str,
    history: Vec<crate::HistoryEntry>,
    kind: Option<String>,
    regenerate: Option<(String, String)>,
) -> Effect {
    let request_id = state.next_request_id();
    let regenerate_id = regenerate.as_ref().map(|(id, _)| id.clone());
    state.pending.insert(
        request_id,
        PendingRequest {
            kind: kind.clone(),
            regenerate,
        },
    );
    Effect::SubmitChat(ChatSubmission {
        request_id,
        session_id: state.session_id.clone(),
        workspace_id: state.workspace_id.clone(),
        message: text.to_string(),
        history,
        kind,
        regenerate: regenerate_id,
    })
}

fn apply_reply(state: &mut AppState, pending: PendingRequest, content: &str) -> Vec<Effect> {
    match pending.regenerate {
        Some((message_id, _previous)) => {
            state.transcript.apply_delta(&message_id, content, None);
            state.transcript.finalize(&message_id);
            state.transcript.append_variant(&message_id, content);
        }
        None => {
            state.transcript.push_assistant(content);
        }
    }
    vec![persist_messages(state)]
}

fn start_job(
    state: &mut AppState,
    pending: PendingRequest,
    job_id: String,
    kind: String,
    at_ms: i64,
) -> Vec<Effect> {
    if state.registry.contains(&job_id) || state.job_phase(&job_id).is_live() {
        ws_warn!("job {} already registered; ignoring duplicate start", job_id);
        return Vec::new();
    }
    let response_message_id = match pending.regenerate {
        Some((message_id, previous)) => {
            state.regenerations.insert(message_id.clone(), previous);
            state.transcript.resume_streaming(&message_id, &job_id);
            message_id
        }
        None => {
            let message_id = fresh_response_id(&job_id);
            state.transcript.apply_delta(&message_id, "", Some(&job_id));
            message_id
        }
    };
    let kind = if kind.is_empty() {
        pending.kind.unwrap_or_else(|| "chat".to_string())
    } else {
        kind
    };
    let job = Job {
        job_id: job_id.clone(),
        workspace_id: Some(state.workspace_id.clone()),
        session_id: state.session_id.clone(),
        kind,
        response_message_id,
        started_at_ms: at_ms,
    };
    state.runtimes.insert(
        job_id.clone(),
        JobRuntime {
            status: Some("Starting...".to_string()),
            ..JobRuntime::default()
        },
    );
    state.current_job = Some(job_id);
    let mut effects = state.registry.register(job.clone());
    effects.push(Effect::OpenStream { job });
    effects.push(persist_messages(state));
    effects
}

/// Id of the message a new (non-regeneration) job streams into.
fn fresh_response_id(job_id: &str) -> String {
    format!("assistant-{job_id}")
}

fn resume_job(state: &mut AppState, job_id: &str) -> Vec<Effect> {
    let Some(job) = state.registry.get(job_id).cloned() else {
        ws_debug!("resume ignored for unknown job {}", job_id);
        return Vec::new();
    };
    if state.job_phase(job_id).is_live() {
        return Vec::new();
    }
    state
        .transcript
        .resume_streaming(&job.response_message_id, job_id);
    state.runtimes.insert(
        job_id.to_string(),
        JobRuntime {
            status: Some("Reconnecting...".to_string()),
            ..JobRuntime::default()
        },
    );
    state.current_job = Some(job_id.to_string());
    state.mark_dirty();
    vec![Effect::OpenStream { job }]
}

/// Stops and unregisters jobs whose response messages were discarded.
fn drop_jobs_of(state: &mut AppState, removed: &[Message]) -> Vec<Effect> {
    let mut stale: Vec<String> = Vec::new();
    for message in removed {
        state.regenerations.remove(&message.id);
        if let Some(job_id) = &message.job_id {
            stale.push(job_id.clone());
        }
    }
    // Regeneration jobs stream into an older message.
    stale.extend(
        state
            .registry
            .jobs()
            .filter(|job| removed.iter().any(|m| m.id == job.response_message_id))
            .map(|job| job.job_id.clone()),
    );
    stale.sort();
    stale.dedup();

    let mut effects = Vec::new();
    for job_id in stale {
        if !state.registry.contains(&job_id) {
            continue;
        }
        effects.extend(state.registry.unregister(&job_id));
        state.progress.clear_job_activity(&job_id);
        if state.current_job.as_deref() == Some(job_id.as_str()) {
            state.current_job = None;
        }
        state.runtimes.insert(
            job_id,
            JobRuntime {
                phase: crate::JobPhase::Closed,
                ..JobRuntime::default()
            },
        );
    }
    effects
}

fn regenerate(state: &mut AppState, message_id: &str) -> Vec<Effect> {
    let Some(message) = state.transcript.get(message_id) else {
        return Vec::new();
    };
    if message.role != Role::Assistant || message.is_streaming {
        ws_debug!("regenerate ignored for {}", message_id);
        return Vec::new();
    }
    let Some(prompt) = state.transcript.preceding_user(message_id).cloned() else {
        return Vec::new();
    };
    let removed = state.transcript.truncate_after_id(message_id);
    let mut effects = drop_jobs_of(state, &removed);

    let history = state.transcript.history_before(Some(&prompt.id));
    let Some(previous) = state.transcript.begin_regeneration(message_id) else {
        return effects;
    };
    state.mark_dirty();
    let prompt_text = state.transcript.displayed_content(&prompt).to_string();
    effects.push(submit(
        state,
        &prompt_text,
        history,
        None,
        Some((message_id.to_string(), previous)),
    ));
    effects.push(persist_messages(state));
    effects
}

fn edit_message(state: &mut AppState, message_id: &str, content: &str, redo: bool) -> Vec<Effect> {
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }
    let Some(removed) = state.transcript.edit_and_truncate(message_id, content) else {
        ws_debug!("edit ignored for {}", message_id);
        return Vec::new();
    };
    state.mark_dirty();
    let mut effects = drop_jobs_of(state, &removed);
    if redo {
        // The edited message already stands in for the user turn.
        let history = state.transcript.history_before(Some(message_id));
        effects.push(submit(state, content, history, None, None));
    }
    effects.push(persist_messages(state));
    effects
}
