use pretty_assertions::assert_eq;
use serde_json::json;
use workspace_core::{
    update, AppState, ChatOutcome, ConnectionState, Effect, FileChange, Job, JobPhase, Msg,
    Notification, RestoreSnapshot, Role, StreamEvent, TabKind,
};

fn restored(workspace: &str) -> AppState {
    let (state, _) = update(
        AppState::new(),
        Msg::Restore(RestoreSnapshot {
            workspace_id: workspace.to_string(),
            session_id: "s1".to_string(),
            ..RestoreSnapshot::default()
        }),
    );
    state
}

fn submitted_request(effects: &[Effect]) -> u64 {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::SubmitChat(submission) => Some(submission.request_id),
            _ => None,
        })
        .expect("a chat submission")
}

/// Sends `text` and resolves it into streaming job `job_id`.
fn start_job(state: AppState, text: &str, job_id: &str) -> (AppState, Vec<Effect>) {
    let (state, effects) = update(
        state,
        Msg::SendMessage {
            text: text.to_string(),
            kind: None,
        },
    );
    let request_id = submitted_request(&effects);
    update(
        state,
        Msg::ChatResolved {
            request_id,
            outcome: ChatOutcome::Job {
                job_id: job_id.to_string(),
                kind: "chapter".to_string(),
            },
            at_ms: 1_000,
        },
    )
}

fn stream(state: AppState, job_id: &str, event: StreamEvent) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::Stream {
            job_id: job_id.to_string(),
            event,
            at_ms: 2_000,
        },
    )
}

fn response(accumulated: &str) -> StreamEvent {
    StreamEvent::ResponseDelta {
        chunk: String::new(),
        accumulated: accumulated.to_string(),
    }
}

fn done(content: Option<&str>) -> StreamEvent {
    StreamEvent::Done {
        content: content.map(ToOwned::to_owned),
        error: None,
    }
}

fn assistant_content(state: &AppState, job_id: &str) -> Option<String> {
    state
        .transcript()
        .get(&format!("assistant-{job_id}"))
        .map(|message| message.content.clone())
}

#[test]
fn chapter_job_streams_to_one_finalized_message() {
    workspace_logging::initialize_for_tests();
    let (state, effects) = start_job(restored("ws1"), "generate chapter 1", "j1");
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::OpenStream { job } if job.job_id == "j1"
    )));
    assert!(effects.contains(&Effect::Notify(Notification::ProcessingChanged {
        workspace_id: "ws1".to_string(),
        processing: true,
    })));
    assert!(state.is_processing());

    let (state, _) = stream(
        state,
        "j1",
        StreamEvent::AgentActivity {
            agent: "writer".to_string(),
            action: "drafting".to_string(),
            description: "Drafting chapter 1".to_string(),
            status: "running".to_string(),
            progress: Some(10),
        },
    );
    let (state, _) = stream(state, "j1", response("Intro..."));
    let (state, _) = stream(state, "j1", response("Intro..."));
    let (state, _) = stream(state, "j1", response("Intro..."));
    let (state, effects) = stream(
        state,
        "j1",
        StreamEvent::FileChanged {
            path: "ch1.md".to_string(),
            change: FileChange::Created,
            content: Some("# Chapter 1".to_string()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::WorkspaceRefresh {
            workspace_id: "ws1".to_string(),
            path: "ch1.md".to_string(),
        })]
    );
    let (state, _) = stream(state, "j1", response("Intro... body..."));
    let (mut state, effects) = stream(state, "j1", done(None));

    assert!(effects.contains(&Effect::CommitMessage {
        session_id: "s1".to_string(),
        role: Role::Assistant,
        content: "Intro... body...".to_string(),
        job_id: Some("j1".to_string()),
    }));
    assert!(effects.contains(&Effect::CloseStream {
        job_id: "j1".to_string()
    }));
    assert!(effects.contains(&Effect::PersistJobs(Vec::new())));

    let assistants: Vec<_> = state
        .transcript()
        .messages()
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .collect();
    assert_eq!(assistants.len(), 1);
    assert_eq!(assistants[0].content, "Intro... body...");
    assert!(!assistants[0].is_streaming);
    assert_eq!(assistants[0].agent.as_deref(), Some("writer"));

    let tab_ids: Vec<_> = state.tabs().tabs().iter().map(|tab| tab.id.as_str()).collect();
    assert_eq!(tab_ids, vec!["agent:writer:j1", "file:ch1.md"]);
    assert_eq!(state.tabs().active(), Some("file:ch1.md"));

    assert!(!state.registry().contains("j1"));
    assert!(!state.is_processing());
    assert_eq!(state.job_phase("j1"), JobPhase::Closed);
    assert_eq!(state.current_job(), None);
    assert!(state.consume_dirty());
}

#[test]
fn replayed_terminal_event_changes_nothing() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(state, "j1", response("answer"));
    let (mut once, _) = stream(state, "j1", done(Some("answer")));
    once.consume_dirty();

    let (twice, effects) = stream(once.clone(), "j1", done(Some("answer")));
    assert!(effects.is_empty());
    assert_eq!(once, twice);

    let (late, effects) = stream(twice, "j1", response("answer and more"));
    assert!(effects.is_empty());
    assert_eq!(assistant_content(&late, "j1").as_deref(), Some("answer"));
}

#[test]
fn stale_accumulation_never_shrinks_content() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(state, "j1", response("Intro... body..."));
    let (state, _) = stream(state, "j1", response("Intro..."));
    assert_eq!(
        assistant_content(&state, "j1").as_deref(),
        Some("Intro... body...")
    );
}

#[test]
fn events_for_unknown_jobs_are_dropped() {
    let state = restored("ws1");
    let (next, effects) = stream(state.clone(), "ghost", response("boo"));
    assert!(effects.is_empty());
    assert_eq!(state, next);
}

#[test]
fn concurrent_jobs_share_one_file_tab() {
    let (state, _) = start_job(restored("ws1"), "first", "j1");
    let (state, _) = start_job(state, "second", "j2");
    assert_eq!(state.registry().len(), 2);

    let (state, _) = stream(
        state,
        "j1",
        StreamEvent::FileChanged {
            path: "notes.md".to_string(),
            change: FileChange::Created,
            content: Some("from j1".to_string()),
        },
    );
    let (state, _) = stream(
        state,
        "j2",
        StreamEvent::FileChanged {
            path: "./notes.md".to_string(),
            change: FileChange::Updated,
            content: Some("from j2".to_string()),
        },
    );

    let files: Vec<_> = state
        .tabs()
        .tabs()
        .iter()
        .filter(|tab| tab.kind == TabKind::File)
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].data.get("content"), Some(&json!("from j2")));
    assert_eq!(files[0].job_id.as_deref(), Some("j2"));

    let (state, _) = stream(state, "j1", done(None));
    assert!(state.is_processing());
    let (state, _) = stream(state, "j2", done(None));
    assert!(!state.is_processing());
}

#[test]
fn failed_job_appends_error_and_drops_empty_placeholder() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, effects) = stream(
        state,
        "j1",
        StreamEvent::Done {
            content: None,
            error: Some("model overloaded".to_string()),
        },
    );

    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::CommitMessage { role: Role::Assistant, .. })));
    assert!(assistant_content(&state, "j1").is_none());
    let last = state.transcript().messages().last().expect("error message");
    assert!(last.is_error);
    assert_eq!(last.content, "Job failed: model overloaded");
    assert!(!state.is_processing());
}

#[test]
fn immediate_reply_needs_no_job() {
    let (state, effects) = update(
        restored("ws1"),
        Msg::SendMessage {
            text: "  hello  ".to_string(),
            kind: None,
        },
    );
    assert!(effects.contains(&Effect::CommitMessage {
        session_id: "s1".to_string(),
        role: Role::User,
        content: "hello".to_string(),
        job_id: None,
    }));
    let request_id = submitted_request(&effects);
    let (state, effects) = update(
        state,
        Msg::ChatResolved {
            request_id,
            outcome: ChatOutcome::Reply {
                content: "hi there".to_string(),
            },
            at_ms: 5,
        },
    );
    assert!(effects
        .iter()
        .all(|effect| matches!(effect, Effect::PersistMessages { .. })));
    let contents: Vec<_> = state
        .transcript()
        .messages()
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(contents, vec!["hello", "hi there"]);
    assert!(state.registry().is_empty());
}

#[test]
fn blank_messages_are_ignored() {
    let (state, effects) = update(
        restored("ws1"),
        Msg::SendMessage {
            text: "   ".to_string(),
            kind: None,
        },
    );
    assert!(effects.is_empty());
    assert!(state.transcript().messages().is_empty());
}

#[test]
fn chat_failure_surfaces_error_message() {
    let (state, effects) = update(
        restored("ws1"),
        Msg::SendMessage {
            text: "hello".to_string(),
            kind: None,
        },
    );
    let request_id = submitted_request(&effects);
    let (state, _) = update(
        state,
        Msg::ChatFailed {
            request_id,
            error: "connection refused".to_string(),
        },
    );
    let last = state.transcript().messages().last().expect("error message");
    assert!(last.is_error);
    assert_eq!(last.content, "Request failed: connection refused");
    assert!(state.registry().is_empty());
}

#[test]
fn duplicate_job_start_is_ignored() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, effects) = update(
        state,
        Msg::SendMessage {
            text: "again".to_string(),
            kind: None,
        },
    );
    let request_id = submitted_request(&effects);
    let (state, effects) = update(
        state,
        Msg::ChatResolved {
            request_id,
            outcome: ChatOutcome::Job {
                job_id: "j1".to_string(),
                kind: "chapter".to_string(),
            },
            at_ms: 7,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.registry().len(), 1);
}

#[test]
fn stop_finalizes_without_committing() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(state, "j1", response("partial"));
    let (state, effects) = update(
        state,
        Msg::StopJob {
            job_id: "j1".to_string(),
        },
    );

    assert!(effects.contains(&Effect::CloseStream {
        job_id: "j1".to_string()
    }));
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::CommitMessage { .. })));
    let message = state.transcript().get("assistant-j1").expect("kept");
    assert_eq!(message.content, "partial");
    assert!(!message.is_streaming);
    assert!(!state.registry().contains("j1"));

    let (_, effects) = update(
        state,
        Msg::StopJob {
            job_id: "j1".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CloseStream {
            job_id: "j1".to_string()
        }]
    );
}

#[test]
fn lost_connection_keeps_job_resumable() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(state, "j1", response("partial"));
    let (state, effects) = update(
        state,
        Msg::Connection {
            job_id: "j1".to_string(),
            state: ConnectionState::Closed {
                reason: "retries exhausted".to_string(),
            },
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::ConnectionLost {
            job_id: "j1".to_string()
        })]
    );
    assert_eq!(state.job_phase("j1"), JobPhase::Disconnected);
    assert!(state.registry().contains("j1"));
    assert!(!state.transcript().get("assistant-j1").expect("kept").is_streaming);

    // Events arriving while disconnected are dropped.
    let (state, effects) = stream(state, "j1", response("partial and more"));
    assert!(effects.is_empty());
    assert_eq!(assistant_content(&state, "j1").as_deref(), Some("partial"));

    let (state, effects) = update(
        state,
        Msg::ResumeJob {
            job_id: "j1".to_string(),
        },
    );
    assert!(matches!(
        effects.as_slice(),
        [Effect::OpenStream { job }] if job.job_id == "j1"
    ));
    assert!(state.transcript().get("assistant-j1").expect("kept").is_streaming);

    let (state, _) = stream(state, "j1", response("partial and more"));
    let (state, _) = stream(state, "j1", done(None));
    assert_eq!(
        assistant_content(&state, "j1").as_deref(),
        Some("partial and more")
    );
    assert!(!state.registry().contains("j1"));
}

#[test]
fn transport_close_after_terminal_event_is_ignored() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(state, "j1", done(Some("ok")));
    let (next, effects) = update(
        state.clone(),
        Msg::Connection {
            job_id: "j1".to_string(),
            state: ConnectionState::Closed {
                reason: "eof".to_string(),
            },
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, next);
}

fn persisted_job(job_id: &str, workspace: Option<&str>) -> Job {
    Job {
        job_id: job_id.to_string(),
        workspace_id: workspace.map(ToOwned::to_owned),
        session_id: "s1".to_string(),
        kind: "chapter".to_string(),
        response_message_id: format!("assistant-{job_id}"),
        started_at_ms: 0,
    }
}

fn opened(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::OpenStream { job } => Some(job.job_id.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn restore_resumes_each_matching_job_once() {
    let snapshot = RestoreSnapshot {
        workspace_id: "ws1".to_string(),
        session_id: "s1".to_string(),
        jobs: vec![
            persisted_job("j1", Some("ws1")),
            persisted_job("j2", Some("ws2")),
            persisted_job("j3", None),
        ],
        messages: Vec::new(),
    };

    let (state, effects) = update(AppState::new(), Msg::Restore(snapshot.clone()));
    assert_eq!(opened(&effects), vec!["j1", "j3"]);
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::PersistJobs(_))));
    assert!(state.transcript().get("assistant-j1").expect("placeholder").is_streaming);

    let (_, effects) = update(state, Msg::Restore(snapshot));
    assert!(opened(&effects).is_empty());
}

#[test]
fn switching_workspace_clears_tabs() {
    let (state, _) = start_job(restored("ws1"), "go", "j1");
    let (state, _) = stream(
        state,
        "j1",
        StreamEvent::ImageGenerated {
            path: "img/cover.png".to_string(),
            prompt: Some("a cover".to_string()),
        },
    );
    assert_eq!(state.tabs().tabs().len(), 1);

    let jobs = state.registry().snapshot();
    let (state, effects) = update(
        state,
        Msg::Restore(RestoreSnapshot {
            workspace_id: "ws2".to_string(),
            session_id: "s2".to_string(),
            jobs,
            messages: Vec::new(),
        }),
    );
    assert!(opened(&effects).is_empty());
    assert!(state.tabs().tabs().is_empty());
    assert!(!state.view().panel_open);
    // The ws1 job is still tracked, but not shown for ws2.
    assert!(state.registry().contains("j1"));
    assert!(state.view().jobs.is_empty());
}
