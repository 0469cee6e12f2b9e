//! One push connection per job, with reconnect and idempotent open/close.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use workspace_core::{ConnectionState, JobId};
use workspace_logging::{with_job_tag, ws_debug, ws_info, ws_warn};

use crate::{
    decode_event, DecodeError, EngineEvent, EventSink, EventTransport, ReconnectPolicy,
    SseDecoder, SseFrame, StreamError, StreamTarget,
};

struct Connection {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Connections {
    by_job: HashMap<JobId, Connection>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct StreamRouter {
    transport: Arc<dyn EventTransport>,
    policy: ReconnectPolicy,
    connections: Arc<Mutex<Connections>>,
}

impl StreamRouter {
    pub fn new(transport: Arc<dyn EventTransport>, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            connections: Arc::new(Mutex::new(Connections::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connections> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the connection task for `target` on the current tokio runtime.
    ///
    /// Returns `false` without doing anything if the job already has one.
    pub fn open(&self, target: StreamTarget, sink: Arc<dyn EventSink>) -> bool {
        let (generation, cancel) = {
            let mut connections = self.lock();
            if connections.by_job.contains_key(&target.job_id) {
                ws_debug!("stream for {} already open", target.job_id);
                return false;
            }
            connections.next_generation += 1;
            let generation = connections.next_generation;
            let cancel = CancellationToken::new();
            connections.by_job.insert(
                target.job_id.clone(),
                Connection {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            (generation, cancel)
        };

        ws_info!("opening stream for job {}", target.job_id);
        let router = self.clone();
        tokio::spawn(async move {
            let job_id = target.job_id.clone();
            router.run(target, sink, cancel).await;
            router.forget(&job_id, generation);
        });
        true
    }

    /// Cancels the job's connection task. Returns `false` if none was open.
    pub fn close(&self, job_id: &str) -> bool {
        let removed = self.lock().by_job.remove(job_id);
        match removed {
            Some(connection) => {
                ws_info!("closing stream for job {}", job_id);
                connection.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, job_id: &str) -> bool {
        self.lock().by_job.contains_key(job_id)
    }

    pub fn open_count(&self) -> usize {
        self.lock().by_job.len()
    }

    /// Drops the bookkeeping of a finished task unless a newer connection
    /// for the same job replaced it.
    fn forget(&self, job_id: &str, generation: u64) {
        let mut connections = self.lock();
        if connections
            .by_job
            .get(job_id)
            .is_some_and(|connection| connection.generation == generation)
        {
            connections.by_job.remove(job_id);
        }
    }

    async fn run(&self, target: StreamTarget, sink: Arc<dyn EventSink>, cancel: CancellationToken) {
        let mut session = Session::default();
        let mut attempt: u32 = 0;
        loop {
            session.delivered = false;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = self.stream_once(&target, sink.as_ref(), &mut session) => outcome,
            };
            let error = match outcome {
                Ok(()) => return,
                Err(error) => error,
            };
            if session.delivered {
                attempt = 0;
            }
            attempt += 1;

            if !error.is_retryable() || attempt > self.policy.max_attempts {
                with_job_tag(&target.job_id, || {
                    ws_warn!("giving up after {} attempt(s): {}", attempt, error)
                });
                sink.emit(EngineEvent::Connection {
                    job_id: target.job_id.clone(),
                    state: ConnectionState::Closed {
                        reason: error.to_string(),
                    },
                });
                return;
            }

            let delay = session
                .retry
                .unwrap_or_else(|| self.policy.backoff(attempt))
                .min(self.policy.max_backoff);
            with_job_tag(&target.job_id, || {
                ws_debug!("reconnecting in {:?} (attempt {}): {}", delay, attempt, error)
            });
            sink.emit(EngineEvent::Connection {
                job_id: target.job_id.clone(),
                state: ConnectionState::Reconnecting {
                    attempt,
                    reason: error.to_string(),
                },
            });
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs one connection until a terminal event (`Ok`) or a failure.
    async fn stream_once(
        &self,
        target: &StreamTarget,
        sink: &dyn EventSink,
        session: &mut Session,
    ) -> Result<(), StreamError> {
        let mut body = self
            .transport
            .connect(target, session.last_event_id.as_deref())
            .await?;
        sink.emit(EngineEvent::Connection {
            job_id: target.job_id.clone(),
            state: ConnectionState::Connected,
        });

        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                if forward(target, sink, frame, session) {
                    return Ok(());
                }
            }
            session.sync(&decoder);
        }
        if let Some(frame) = decoder.finish() {
            if forward(target, sink, frame, session) {
                return Ok(());
            }
        }
        session.sync(&decoder);
        Err(StreamError::EndOfStream)
    }
}

/// Resume state carried across reconnects of one job.
#[derive(Debug, Default)]
struct Session {
    last_event_id: Option<String>,
    retry: Option<Duration>,
    /// Whether the current connection delivered at least one event.
    delivered: bool,
}

impl Session {
    fn sync(&mut self, decoder: &SseDecoder) {
        if let Some(id) = decoder.last_event_id() {
            self.last_event_id = Some(id.to_string());
        }
        if let Some(retry) = decoder.retry() {
            self.retry = Some(retry);
        }
    }
}

/// Decodes and emits one frame. Returns `true` for a terminal event.
fn forward(target: &StreamTarget, sink: &dyn EventSink, frame: SseFrame, session: &mut Session) -> bool {
    if let Some(id) = &frame.id {
        session.last_event_id = Some(id.clone());
    }
    match decode_event(frame.event.as_deref(), &frame.data) {
        Ok(event) => {
            let terminal = event.is_terminal();
            session.delivered = true;
            sink.emit(EngineEvent::Stream {
                job_id: target.job_id.clone(),
                event,
            });
            terminal
        }
        Err(DecodeError::UnknownEvent(name)) => {
            with_job_tag(&target.job_id, || ws_debug!("skipping unknown event {}", name));
            false
        }
        Err(err) => {
            with_job_tag(&target.job_id, || ws_warn!("dropping frame: {}", err));
            false
        }
    }
}
