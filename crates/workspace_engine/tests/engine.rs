use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use workspace_core::{ChatOutcome, ChatSubmission, Job, StreamEvent};
use workspace_engine::{
    ApiError, ByteStream, ChatApi, CommitRequest, EngineEvent, EngineHandle, EngineSettings,
    EventTransport, StreamError, StreamTarget,
};

struct ScriptedTransport;

#[async_trait::async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(
        &self,
        _target: &StreamTarget,
        _last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError> {
        let body = "event: response_chunk\ndata: {\"chunk\":\"hi\"}\n\nevent: done\ndata: {}\n\n";
        Ok(stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))]).boxed())
    }
}

struct EchoApi;

#[async_trait::async_trait]
impl ChatApi for EchoApi {
    async fn submit(&self, submission: &ChatSubmission) -> Result<ChatOutcome, ApiError> {
        Ok(ChatOutcome::Reply {
            content: format!("echo: {}", submission.message),
        })
    }

    async fn commit(&self, _commit: &CommitRequest) -> Result<(), ApiError> {
        Err(ApiError::Timeout)
    }
}

fn engine() -> EngineHandle {
    EngineHandle::with_parts(
        Arc::new(ScriptedTransport),
        Arc::new(EchoApi),
        EngineSettings::default(),
    )
    .expect("engine")
}

fn next_event(engine: &EngineHandle) -> EngineEvent {
    engine
        .recv_timeout(Duration::from_secs(5))
        .expect("engine event")
}

#[test]
fn submit_round_trips_through_engine_thread() {
    let engine = engine();
    engine.submit_chat(ChatSubmission {
        request_id: 9,
        session_id: "s1".to_string(),
        workspace_id: "ws1".to_string(),
        message: "ping".to_string(),
        history: Vec::new(),
        kind: None,
        regenerate: None,
    });
    assert_eq!(
        next_event(&engine),
        EngineEvent::ChatCompleted {
            request_id: 9,
            result: Ok(ChatOutcome::Reply {
                content: "echo: ping".to_string()
            }),
        }
    );
}

#[test]
fn failed_commit_is_reported() {
    let engine = engine();
    engine.commit_message(CommitRequest {
        session_id: "s1".to_string(),
        role: workspace_core::Role::User,
        content: "hello".to_string(),
        job_id: None,
    });
    assert_eq!(
        next_event(&engine),
        EngineEvent::CommitFailed {
            session_id: "s1".to_string(),
            error: ApiError::Timeout,
        }
    );
}

#[test]
fn opened_stream_delivers_events_in_order() {
    let engine = engine();
    engine.open_stream(&Job {
        job_id: "j1".to_string(),
        workspace_id: Some("ws1".to_string()),
        session_id: "s1".to_string(),
        kind: "chat".to_string(),
        response_message_id: "assistant-j1".to_string(),
        started_at_ms: 0,
    });

    let mut streamed = Vec::new();
    while streamed.len() < 2 {
        if let EngineEvent::Stream { job_id, event } = next_event(&engine) {
            assert_eq!(job_id, "j1");
            streamed.push(event);
        }
    }
    assert_eq!(
        streamed,
        vec![
            StreamEvent::ResponseDelta {
                chunk: "hi".to_string(),
                accumulated: "hi".to_string(),
            },
            StreamEvent::Done {
                content: None,
                error: None,
            },
        ]
    );
}

#[test]
fn auto_close_fires_after_delay() {
    let engine = engine();
    engine.schedule_auto_close("agent:worker:j1", Duration::from_millis(10));
    assert_eq!(
        next_event(&engine),
        EngineEvent::AutoCloseDue {
            tab_id: "agent:worker:j1".to_string()
        }
    );
}
