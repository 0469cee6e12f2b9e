use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use pretty_assertions::assert_eq;
use workspace_core::{ConnectionState, StreamEvent};
use workspace_engine::{
    ByteStream, EngineEvent, EngineSettings, EventSink, EventTransport, ReconnectPolicy,
    ReqwestEventTransport, StreamError, StreamRouter, StreamTarget,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingSink {
    fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Polls until `done` holds for the recorded events, or panics.
    async fn wait_until(&self, done: impl Fn(&[EngineEvent]) -> bool) -> Vec<EngineEvent> {
        for _ in 0..200 {
            let events = self.snapshot();
            if done(&events) {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out; recorded {:?}", self.snapshot());
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn target() -> StreamTarget {
    StreamTarget {
        job_id: "j1".to_string(),
        session_id: "s1".to_string(),
    }
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

fn router_for(server: &MockServer, policy: ReconnectPolicy) -> StreamRouter {
    let settings = EngineSettings {
        base_url: server.uri(),
        token: Some("t0k".to_string()),
        ..EngineSettings::default()
    };
    let transport = ReqwestEventTransport::new(&settings).expect("client");
    StreamRouter::new(Arc::new(transport), policy)
}

fn has_terminal(events: &[EngineEvent]) -> bool {
    events.iter().any(|event| match event {
        EngineEvent::Stream { event, .. } => event.is_terminal(),
        EngineEvent::Connection {
            state: ConnectionState::Closed { .. },
            ..
        } => true,
        _ => false,
    })
}

fn stream_events(events: &[EngineEvent]) -> Vec<StreamEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Stream { event, .. } => Some(event.clone()),
            _ => None,
        })
        .collect()
}

const EVENTS_PATH: &str = "/api/sessions/s1/jobs/j1/events";

#[tokio::test]
async fn streams_decoded_events_until_done() {
    workspace_logging::initialize_for_tests();
    let server = MockServer::start().await;
    let body = concat!(
        "event: connected\ndata: {}\n\n",
        "event: response_chunk\ndata: {\"chunk\":\"Intro...\",\"accumulated\":\"Intro...\"}\n\n",
        "event: telemetry\ndata: {}\n\n",
        "event: response_chunk\ndata: {not json\n\n",
        "event: done\ndata: {\"content\":\"Intro...\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("Accept", "text/event-stream"))
        .and(header("Authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server, fast_policy(3));
    let sink = RecordingSink::default();
    assert!(router.open(target(), Arc::new(sink.clone())));

    let events = sink.wait_until(has_terminal).await;
    assert_eq!(
        events[0],
        EngineEvent::Connection {
            job_id: "j1".to_string(),
            state: ConnectionState::Connected,
        }
    );
    assert_eq!(
        stream_events(&events),
        vec![
            StreamEvent::Connected { message: None },
            StreamEvent::ResponseDelta {
                chunk: "Intro...".to_string(),
                accumulated: "Intro...".to_string(),
            },
            StreamEvent::Done {
                content: Some("Intro...".to_string()),
                error: None,
            },
        ]
    );

    // The finished task releases its slot.
    for _ in 0..100 {
        if !router.is_open("j1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!router.is_open("j1"));
}

#[tokio::test]
async fn reconnects_with_last_event_id_after_early_eof() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "retry: 5\nid: 7\nevent: response_chunk\ndata: {\"chunk\":\"partial\"}\n\n",
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("Last-Event-ID", "7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("event: done\ndata: {}\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let router = router_for(&server, fast_policy(3));
    let sink = RecordingSink::default();
    router.open(target(), Arc::new(sink.clone()));

    let events = sink.wait_until(has_terminal).await;
    assert!(events.contains(&EngineEvent::Connection {
        job_id: "j1".to_string(),
        state: ConnectionState::Reconnecting {
            attempt: 1,
            reason: StreamError::EndOfStream.to_string(),
        },
    }));
    assert_eq!(
        stream_events(&events).last(),
        Some(&StreamEvent::Done {
            content: None,
            error: None,
        })
    );
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let router = router_for(&server, fast_policy(2));
    let sink = RecordingSink::default();
    router.open(target(), Arc::new(sink.clone()));

    let events = sink.wait_until(has_terminal).await;
    let states: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Connection { state, .. } => Some(state.clone()),
            _ => None,
        })
        .collect();
    let reason = StreamError::HttpStatus(503).to_string();
    assert_eq!(
        states,
        vec![
            ConnectionState::Reconnecting {
                attempt: 1,
                reason: reason.clone(),
            },
            ConnectionState::Reconnecting {
                attempt: 2,
                reason: reason.clone(),
            },
            ConnectionState::Closed { reason },
        ]
    );
}

#[tokio::test]
async fn client_errors_close_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server, fast_policy(5));
    let sink = RecordingSink::default();
    router.open(target(), Arc::new(sink.clone()));

    let events = sink.wait_until(has_terminal).await;
    assert_eq!(
        events,
        vec![EngineEvent::Connection {
            job_id: "j1".to_string(),
            state: ConnectionState::Closed {
                reason: StreamError::HttpStatus(404).to_string(),
            },
        }]
    );
}

/// Connects instantly to a stream that never yields.
struct SilentTransport;

#[async_trait::async_trait]
impl EventTransport for SilentTransport {
    async fn connect(
        &self,
        _target: &StreamTarget,
        _last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError> {
        Ok(stream::pending::<Result<Bytes, StreamError>>().boxed())
    }
}

#[tokio::test]
async fn open_is_idempotent_and_close_cancels() {
    let router = StreamRouter::new(Arc::new(SilentTransport), ReconnectPolicy::default());
    let sink = RecordingSink::default();

    assert!(router.open(target(), Arc::new(sink.clone())));
    assert!(!router.open(target(), Arc::new(sink.clone())));
    assert_eq!(router.open_count(), 1);

    sink.wait_until(|events| !events.is_empty()).await;
    assert!(router.close("j1"));
    assert!(!router.close("j1"));
    assert!(!router.is_open("j1"));

    // A closed job can be opened again.
    assert!(router.open(target(), Arc::new(sink.clone())));
    assert!(router.close("j1"));
}
