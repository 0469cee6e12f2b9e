use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use workspace_logging::ws_debug;

use crate::{EngineError, EngineSettings, StreamError, StreamTarget};

/// Raw body of an open push connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Opens the server-push connection for a job.
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(
        &self,
        target: &StreamTarget,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestEventTransport {
    client: reqwest::Client,
    settings: EngineSettings,
}

impl ReqwestEventTransport {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.idle_timeout)
            .build()
            .map_err(|err| EngineError::Client(err.to_string()))?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    /// `{base}/api/sessions/{session}/jobs/{job}/events`, ids percent-encoded.
    pub fn events_url(&self, target: &StreamTarget) -> Result<url::Url, StreamError> {
        self.settings
            .endpoint(&[
                "api",
                "sessions",
                target.session_id.as_str(),
                "jobs",
                target.job_id.as_str(),
                "events",
            ])
            .map_err(StreamError::InvalidUrl)
    }
}

#[async_trait::async_trait]
impl EventTransport for ReqwestEventTransport {
    async fn connect(
        &self,
        target: &StreamTarget,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError> {
        let url = self.events_url(target)?;
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }
        if let Some(id) = last_event_id {
            ws_debug!("resuming {} after event {}", target.job_id, id);
            request = request.header("Last-Event-ID", id);
        }

        let response = request
            .send()
            .await
            .map_err(|err| StreamError::Connect(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::HttpStatus(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| StreamError::Read(err.to_string())))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_url_encodes_ids_and_ignores_trailing_slash() {
        let settings = EngineSettings {
            base_url: "http://localhost:8000/".to_string(),
            ..EngineSettings::default()
        };
        let transport = ReqwestEventTransport::new(&settings).unwrap();
        let target = StreamTarget {
            job_id: "job 1".to_string(),
            session_id: "s/1".to_string(),
        };
        assert_eq!(
            transport.events_url(&target).unwrap().as_str(),
            "http://localhost:8000/api/sessions/s%2F1/jobs/job%201/events"
        );
    }
}
