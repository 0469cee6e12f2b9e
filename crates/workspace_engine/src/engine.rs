use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use workspace_core::{ChatSubmission, Job, JobId, TabId};
use workspace_logging::{ws_info, ws_warn};

use crate::{
    ChannelEventSink, ChatApi, CommitRequest, EngineError, EngineEvent, EngineSettings, EventSink,
    EventTransport, ReqwestChatApi, ReqwestEventTransport, StreamRouter, StreamTarget,
};

enum EngineCommand {
    OpenStream(StreamTarget),
    CloseStream { job_id: JobId },
    SubmitChat(ChatSubmission),
    CommitMessage(CommitRequest),
    ScheduleAutoClose { tab_id: TabId, delay: Duration },
}

/// Owns the IO runtime thread. Commands go in through methods; results
/// come back through [`EngineHandle::try_recv`].
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let transport: Arc<dyn EventTransport> = Arc::new(ReqwestEventTransport::new(&settings)?);
        let api: Arc<dyn ChatApi> = Arc::new(ReqwestChatApi::new(&settings)?);
        Self::with_parts(transport, api, settings)
    }

    /// Builds an engine over caller-supplied transport and API clients.
    pub fn with_parts(
        transport: Arc<dyn EventTransport>,
        api: Arc<dyn ChatApi>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Runtime::new()?;
        let router = StreamRouter::new(transport, settings.reconnect.clone());
        let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(event_tx));

        thread::spawn(move || {
            let _guard = runtime.enter();
            while let Ok(command) = cmd_rx.recv() {
                handle_command(&router, &api, &sink, command);
            }
            ws_info!("engine command channel closed; shutting down");
        });

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn open_stream(&self, job: &Job) {
        self.send(EngineCommand::OpenStream(StreamTarget::from(job)));
    }

    pub fn close_stream(&self, job_id: impl Into<JobId>) {
        self.send(EngineCommand::CloseStream {
            job_id: job_id.into(),
        });
    }

    pub fn submit_chat(&self, submission: ChatSubmission) {
        self.send(EngineCommand::SubmitChat(submission));
    }

    pub fn commit_message(&self, commit: CommitRequest) {
        self.send(EngineCommand::CommitMessage(commit));
    }

    pub fn schedule_auto_close(&self, tab_id: impl Into<TabId>, delay: Duration) {
        self.send(EngineCommand::ScheduleAutoClose {
            tab_id: tab_id.into(),
            delay,
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Blocks up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            ws_warn!("engine thread is gone; command dropped");
        }
    }
}

fn handle_command(
    router: &StreamRouter,
    api: &Arc<dyn ChatApi>,
    sink: &Arc<dyn EventSink>,
    command: EngineCommand,
) {
    match command {
        EngineCommand::OpenStream(target) => {
            router.open(target, sink.clone());
        }
        EngineCommand::CloseStream { job_id } => {
            router.close(&job_id);
        }
        EngineCommand::SubmitChat(submission) => {
            let api = api.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                let result = api.submit(&submission).await;
                sink.emit(EngineEvent::ChatCompleted {
                    request_id: submission.request_id,
                    result,
                });
            });
        }
        EngineCommand::CommitMessage(commit) => {
            let api = api.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                if let Err(error) = api.commit(&commit).await {
                    sink.emit(EngineEvent::CommitFailed {
                        session_id: commit.session_id,
                        error,
                    });
                }
            });
        }
        EngineCommand::ScheduleAutoClose { tab_id, delay } => {
            let sink = sink.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sink.emit(EngineEvent::AutoCloseDue { tab_id });
            });
        }
    }
}
