use pretty_assertions::assert_eq;
use serde_json::json;
use workspace_core::{ChatOutcome, ChatSubmission, HistoryEntry, Role};
use workspace_engine::{ApiError, ChatApi, CommitRequest, EngineSettings, ReqwestChatApi};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> ReqwestChatApi {
    let settings = EngineSettings {
        base_url: format!("{}/", server.uri()),
        token: Some("t0k".to_string()),
        ..EngineSettings::default()
    };
    ReqwestChatApi::new(&settings).expect("client")
}

fn submission() -> ChatSubmission {
    ChatSubmission {
        request_id: 1,
        session_id: "s1".to_string(),
        workspace_id: "ws1".to_string(),
        message: "generate chapter 1".to_string(),
        history: vec![HistoryEntry {
            role: Role::User,
            content: "hello".to_string(),
        }],
        kind: Some("thesis".to_string()),
        regenerate: None,
    }
}

#[tokio::test]
async fn submit_posts_context_and_returns_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("Authorization", "Bearer t0k"))
        .and(body_json(json!({
            "message": "generate chapter 1",
            "session_id": "s1",
            "workspace_id": "ws1",
            "history": [{"role": "user", "content": "hello"}],
            "kind": "thesis",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1", "kind": "thesis"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = api_for(&server).submit(&submission()).await.expect("submit ok");
    assert_eq!(
        outcome,
        ChatOutcome::Job {
            job_id: "j1".to_string(),
            kind: "thesis".to_string(),
        }
    );
}

#[tokio::test]
async fn submit_accepts_immediate_reply_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "Hi!"})))
        .mount(&server)
        .await;

    let outcome = api_for(&server).submit(&submission()).await.expect("submit ok");
    assert_eq!(
        outcome,
        ChatOutcome::Reply {
            content: "Hi!".to_string()
        }
    );
}

#[tokio::test]
async fn submit_reports_http_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = api_for(&server).submit(&submission()).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::HttpStatus {
            status: 500,
            body: "boom".to_string(),
        }
    );
}

#[tokio::test]
async fn submit_rejects_empty_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let err = api_for(&server).submit(&submission()).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn commit_posts_to_session_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/messages"))
        .and(body_json(json!({
            "role": "assistant",
            "content": "Intro... body...",
            "job_id": "j1",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    api_for(&server)
        .commit(&CommitRequest {
            session_id: "s1".to_string(),
            role: Role::Assistant,
            content: "Intro... body...".to_string(),
            job_id: Some("j1".to_string()),
        })
        .await
        .expect("commit ok");
}

#[tokio::test]
async fn commit_encodes_session_id_as_one_segment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/team%2Fs1/messages"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    api_for(&server)
        .commit(&CommitRequest {
            session_id: "team/s1".to_string(),
            role: Role::Assistant,
            content: "done".to_string(),
            job_id: None,
        })
        .await
        .expect("commit ok");
}
