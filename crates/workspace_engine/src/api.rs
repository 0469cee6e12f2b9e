use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use workspace_core::{ChatOutcome, ChatSubmission, JobId, Role, SessionId};
use workspace_logging::ws_debug;

use crate::{ApiError, EngineError, EngineSettings};

/// A finalized message for the external conversation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub job_id: Option<JobId>,
}

/// Request/response side of the backend: chat submission and message commit.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    async fn submit(&self, submission: &ChatSubmission) -> Result<ChatOutcome, ApiError>;
    async fn commit(&self, commit: &CommitRequest) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestChatApi {
    client: reqwest::Client,
    settings: EngineSettings,
}

#[derive(Serialize)]
struct HistoryBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    message: &'a str,
    session_id: &'a str,
    workspace_id: &'a str,
    history: Vec<HistoryBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regenerate: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    reply: Option<String>,
}

#[derive(Serialize)]
struct CommitBody<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a str>,
}

impl ReqwestChatApi {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| EngineError::Client(err.to_string()))?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url, ApiError> {
        self.settings.endpoint(segments).map_err(ApiError::InvalidUrl)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::HttpStatus {
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        })
    }
}

#[async_trait::async_trait]
impl ChatApi for ReqwestChatApi {
    async fn submit(&self, submission: &ChatSubmission) -> Result<ChatOutcome, ApiError> {
        let body = ChatBody {
            message: &submission.message,
            session_id: &submission.session_id,
            workspace_id: &submission.workspace_id,
            history: submission
                .history
                .iter()
                .map(|entry| HistoryBody {
                    role: entry.role.as_str(),
                    content: &entry.content,
                })
                .collect(),
            kind: submission.kind.as_deref(),
            regenerate: submission.regenerate.as_deref(),
        };
        let request = self
            .client
            .post(self.url(&["api", "chat"])?)
            .header(ACCEPT, "application/json")
            .json(&body);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = Self::check(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;

        if let Some(job_id) = parsed.job_id.filter(|id| !id.is_empty()) {
            ws_debug!("chat request {} started job {}", submission.request_id, job_id);
            return Ok(ChatOutcome::Job {
                job_id,
                kind: parsed.kind.unwrap_or_default(),
            });
        }
        match parsed.response.or(parsed.reply) {
            Some(content) => Ok(ChatOutcome::Reply { content }),
            None => Err(ApiError::Decode(
                "response has neither a job id nor a reply".to_string(),
            )),
        }
    }

    async fn commit(&self, commit: &CommitRequest) -> Result<(), ApiError> {
        let body = CommitBody {
            role: commit.role.as_str(),
            content: &commit.content,
            job_id: commit.job_id.as_deref(),
        };
        let url = self.url(&["api", "sessions", commit.session_id.as_str(), "messages"])?;
        let request = self.client.post(url).json(&body);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout;
    }
    ApiError::Network(err.to_string())
}
