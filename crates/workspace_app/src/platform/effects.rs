use std::time::Duration;

use chrono::Utc;
use workspace_core::{Effect, Msg, Notification};
use workspace_engine::{CommitRequest, EngineEvent, EngineHandle};
use workspace_logging::{ws_debug, ws_info, ws_warn};

use super::persistence::StateStore;

/// Receives the typed cross-component signals the core emits.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

/// Prints notifications as one-line status messages.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl NotificationSink for TerminalNotifier {
    fn notify(&mut self, notification: Notification) {
        println!("* {}", describe(&notification));
    }
}

pub fn describe(notification: &Notification) -> String {
    match notification {
        Notification::WorkspaceRefresh { workspace_id, path } => {
            format!("workspace {workspace_id}: {path} changed")
        }
        Notification::SourcesChanged {
            workspace_id,
            count,
        } => format!("workspace {workspace_id}: {count} source(s)"),
        Notification::ProcessingChanged {
            workspace_id,
            processing: true,
        } => format!("workspace {workspace_id}: processing"),
        Notification::ProcessingChanged {
            workspace_id,
            processing: false,
        } => format!("workspace {workspace_id}: idle"),
        Notification::ConnectionLost { job_id } => {
            format!("connection to job {job_id} lost; /resume {job_id} to reconnect")
        }
    }
}

/// Runs core effects against the engine, the state store and the
/// notification sink.
pub struct EffectRunner {
    engine: EngineHandle,
    store: StateStore,
    notifications: Box<dyn NotificationSink>,
}

impl EffectRunner {
    pub fn new(
        engine: EngineHandle,
        store: StateStore,
        notifications: Box<dyn NotificationSink>,
    ) -> Self {
        Self {
            engine,
            store,
            notifications,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SubmitChat(submission) => {
                    ws_info!(
                        "SubmitChat request_id={} history_len={} kind={:?}",
                        submission.request_id,
                        submission.history.len(),
                        submission.kind
                    );
                    self.engine.submit_chat(submission);
                }
                Effect::OpenStream { job } => self.engine.open_stream(&job),
                Effect::CloseStream { job_id } => self.engine.close_stream(job_id),
                Effect::PersistJobs(jobs) => self.store.save_jobs(&jobs),
                Effect::PersistMessages {
                    workspace_id,
                    messages,
                } => self.store.save_messages(&workspace_id, &messages),
                Effect::CommitMessage {
                    session_id,
                    role,
                    content,
                    job_id,
                } => self.engine.commit_message(CommitRequest {
                    session_id,
                    role,
                    content,
                    job_id,
                }),
                Effect::ScheduleAutoClose { tab_id, delay_ms } => {
                    self.engine
                        .schedule_auto_close(tab_id, Duration::from_millis(delay_ms));
                }
                Effect::Notify(notification) => self.notifications.notify(notification),
            }
        }
    }

    /// Drains every engine event available right now into messages.
    pub fn drain_events(&self) -> Vec<Msg> {
        let mut msgs = Vec::new();
        while let Some(event) = self.engine.try_recv() {
            if let Some(msg) = map_engine_event(event, now_ms()) {
                msgs.push(msg);
            }
        }
        msgs
    }

    /// Waits up to `timeout` for one engine event.
    pub fn next_event(&self, timeout: Duration) -> Option<Msg> {
        self.engine
            .recv_timeout(timeout)
            .and_then(|event| map_engine_event(event, now_ms()))
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Translates an engine event into the core message it drives, stamping
/// stream events with `at_ms`.
pub fn map_engine_event(event: EngineEvent, at_ms: i64) -> Option<Msg> {
    match event {
        EngineEvent::Stream { job_id, event } => {
            ws_debug!("stream job_id={} event={}", job_id, event.label());
            Some(Msg::Stream {
                job_id,
                event,
                at_ms,
            })
        }
        EngineEvent::Connection { job_id, state } => Some(Msg::Connection { job_id, state }),
        EngineEvent::ChatCompleted { request_id, result } => Some(match result {
            Ok(outcome) => Msg::ChatResolved {
                request_id,
                outcome,
                at_ms,
            },
            Err(error) => {
                ws_warn!("chat request {} failed: {}", request_id, error);
                Msg::ChatFailed {
                    request_id,
                    error: error.to_string(),
                }
            }
        }),
        EngineEvent::CommitFailed { session_id, error } => {
            ws_warn!("commit to session {} failed: {}", session_id, error);
            None
        }
        EngineEvent::AutoCloseDue { tab_id } => Some(Msg::AutoCloseElapsed { tab_id }),
    }
}
