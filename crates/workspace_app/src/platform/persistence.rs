use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use workspace_core::{
    Job, JobId, Message, MessageSnapshot, Role, SessionId, VariantSet, WorkspaceId,
};
use workspace_engine::{AtomicFileWriter, PersistError};
use workspace_logging::{ws_error, ws_info, ws_warn};

const JOBS_FILENAME: &str = "active_jobs.ron";
const SESSION_FILENAME: &str = "session.ron";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },
    #[error("failed to serialize {file}: {message}")]
    Serialize { file: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    job_id: String,
    #[serde(default)]
    workspace_id: Option<String>,
    session_id: String,
    #[serde(default)]
    kind: String,
    response_message_id: String,
    #[serde(default)]
    started_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum PersistedRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedMessage {
    id: String,
    role: PersistedRole,
    content: String,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    variants: Vec<String>,
    #[serde(default)]
    selected_variant: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedJobs {
    jobs: Vec<PersistedJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedMessages {
    messages: Vec<PersistedMessage>,
}

/// Which workspace and session the client had open, and the job it was
/// last following.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    #[serde(default)]
    pub current_job: Option<JobId>,
}

/// Client-local state files under the state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    writer: AtomicFileWriter,
}

impl StateStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(state_dir),
        }
    }

    /// Active jobs across every workspace. Unreadable state is logged and
    /// treated as empty.
    pub fn load_jobs(&self) -> Vec<Job> {
        let persisted: PersistedJobs = self.load_or_default(JOBS_FILENAME);
        persisted.jobs.into_iter().map(Job::from).collect()
    }

    /// An empty set removes the file.
    pub fn save_jobs(&self, jobs: &[Job]) {
        if jobs.is_empty() {
            if let Err(err) = self.writer.remove(JOBS_FILENAME) {
                ws_error!("Failed to remove {:?}: {}", JOBS_FILENAME, err);
            }
            return;
        }
        let state = PersistedJobs {
            jobs: jobs.iter().map(PersistedJob::from).collect(),
        };
        self.save_logged(JOBS_FILENAME, &state);
    }

    pub fn load_messages(&self, workspace_id: &str) -> Vec<MessageSnapshot> {
        let persisted: PersistedMessages = self.load_or_default(&messages_filename(workspace_id));
        persisted
            .messages
            .into_iter()
            .map(MessageSnapshot::from)
            .collect()
    }

    pub fn save_messages(&self, workspace_id: &str, messages: &[MessageSnapshot]) {
        let state = PersistedMessages {
            messages: messages.iter().map(PersistedMessage::from).collect(),
        };
        self.save_logged(&messages_filename(workspace_id), &state);
    }

    pub fn load_session(&self) -> Option<SessionRecord> {
        match self.load::<SessionRecord>(SESSION_FILENAME) {
            Ok(session) => session,
            Err(err) => {
                ws_warn!("Ignoring stored session: {}", err);
                None
            }
        }
    }

    pub fn save_session(&self, session: &SessionRecord) {
        self.save_logged(SESSION_FILENAME, session);
    }

    fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>, StoreError> {
        let Some(content) = self.writer.read(filename)? else {
            return Ok(None);
        };
        let value = ron::from_str(&content).map_err(|err| StoreError::Parse {
            file: filename.to_string(),
            message: err.to_string(),
        })?;
        ws_info!("Loaded {:?} from {:?}", filename, self.writer.dir());
        Ok(Some(value))
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        match self.load(filename) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                ws_warn!("Failed to load persisted state: {}", err);
                T::default()
            }
        }
    }

    fn save<T: Serialize>(&self, filename: &str, value: &T) -> Result<(), StoreError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content =
            ron::ser::to_string_pretty(value, pretty).map_err(|err| StoreError::Serialize {
                file: filename.to_string(),
                message: err.to_string(),
            })?;
        self.writer.write(filename, &content)?;
        Ok(())
    }

    fn save_logged<T: Serialize>(&self, filename: &str, value: &T) {
        if let Err(err) = self.save(filename, value) {
            ws_error!("Failed to write persisted state to {:?}: {}", filename, err);
        }
    }
}

/// `messages-<workspace>.ron`, with anything outside `[A-Za-z0-9_-]` replaced.
fn messages_filename(workspace_id: &str) -> String {
    let safe: String = workspace_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("messages-{safe}.ron")
}

impl From<PersistedJob> for Job {
    fn from(job: PersistedJob) -> Self {
        Job {
            job_id: job.job_id,
            workspace_id: job.workspace_id,
            session_id: job.session_id,
            kind: job.kind,
            response_message_id: job.response_message_id,
            started_at_ms: job.started_at_ms,
        }
    }
}

impl From<&Job> for PersistedJob {
    fn from(job: &Job) -> Self {
        PersistedJob {
            job_id: job.job_id.clone(),
            workspace_id: job.workspace_id.clone(),
            session_id: job.session_id.clone(),
            kind: job.kind.clone(),
            response_message_id: job.response_message_id.clone(),
            started_at_ms: job.started_at_ms,
        }
    }
}

impl From<PersistedRole> for Role {
    fn from(role: PersistedRole) -> Self {
        match role {
            PersistedRole::User => Role::User,
            PersistedRole::Assistant => Role::Assistant,
            PersistedRole::System => Role::System,
        }
    }
}

impl From<Role> for PersistedRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PersistedRole::User,
            Role::Assistant => PersistedRole::Assistant,
            Role::System => PersistedRole::System,
        }
    }
}

impl From<PersistedMessage> for MessageSnapshot {
    fn from(message: PersistedMessage) -> Self {
        MessageSnapshot {
            message: Message {
                id: message.id,
                role: message.role.into(),
                content: message.content,
                is_streaming: false,
                agent: message.agent,
                job_id: message.job_id,
                reasoning: message.reasoning,
                is_error: message.is_error,
            },
            variants: VariantSet {
                contents: message.variants,
                selected: message.selected_variant,
            },
        }
    }
}

impl From<&MessageSnapshot> for PersistedMessage {
    fn from(snapshot: &MessageSnapshot) -> Self {
        let message = &snapshot.message;
        PersistedMessage {
            id: message.id.clone(),
            role: message.role.into(),
            content: message.content.clone(),
            agent: message.agent.clone(),
            job_id: message.job_id.clone(),
            reasoning: message.reasoning.clone(),
            is_error: message.is_error,
            variants: snapshot.variants.contents.clone(),
            selected_variant: snapshot.variants.selected,
        }
    }
}
