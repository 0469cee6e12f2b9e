use std::time::Duration;

use thiserror::Error;
use workspace_core::{ChatOutcome, ConnectionState, Job, JobId, RequestId, SessionId, StreamEvent, TabId};

/// Where a job's push connection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub job_id: JobId,
    pub session_id: SessionId,
}

impl From<&Job> for StreamTarget {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            session_id: job.session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Decoded event from a job's connection, in transport order.
    Stream { job_id: JobId, event: StreamEvent },
    Connection {
        job_id: JobId,
        state: ConnectionState,
    },
    ChatCompleted {
        request_id: RequestId,
        result: Result<ChatOutcome, ApiError>,
    },
    CommitFailed {
        session_id: SessionId,
        error: ApiError,
    },
    AutoCloseDue { tab_id: TabId },
}

/// Receives engine events from connection and request tasks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// How a dropped connection is retried before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts tolerated before the connection is
    /// reported closed.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    /// Whole-request timeout for chat and commit calls. Push connections are
    /// long-lived and only bounded by `idle_timeout`.
    pub request_timeout: Duration,
    /// Longest silence tolerated on a push connection.
    pub idle_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl EngineSettings {
    /// `base_url` extended by `segments`, each percent-encoded as one path
    /// segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<url::Url, String> {
        let mut url = url::Url::parse(&self.base_url).map_err(|err| err.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(120),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream endpoint returned http status {0}")]
    HttpStatus(u16),
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("stream ended without a terminal event")]
    EndOfStream,
}

impl StreamError {
    /// Client errors other than timeouts and throttling will not heal by
    /// reconnecting.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::InvalidUrl(_) => false,
            StreamError::HttpStatus(code) => !(400..500).contains(code) || matches!(code, 408 | 429),
            StreamError::Connect(_) | StreamError::Read(_) | StreamError::EndOfStream => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    Client(String),
}
