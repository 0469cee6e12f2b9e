//! Command-line flags layered over an optional ron config file.
//!
//! Precedence is CLI, then file, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use serde::Deserialize;
use workspace_core::{CoreConfig, TabPolicy};
use workspace_engine::{EngineSettings, ReconnectPolicy};

use super::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "workspace")]
#[command(about = "Converse with long-running workspace jobs from the terminal")]
pub struct Cli {
    /// Backend base URL
    #[arg(long, env = "WORKSPACE_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token for every request
    #[arg(long, env = "WORKSPACE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Workspace to open
    #[arg(long)]
    pub workspace: Option<String>,

    /// Conversation session id
    #[arg(long)]
    pub session: Option<String>,

    /// Directory for client state files and the log file
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Path to a ron config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_to: Option<LogDestination>,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub workspace: Option<String>,
    pub session: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_to: Option<LogDestination>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub auto_close_delay_ms: Option<u64>,
    pub transient_agent_patterns: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `None` when neither flag nor file names one; the stored session wins then.
    pub workspace: Option<String>,
    pub session: Option<String>,
    pub state_dir: PathBuf,
    pub log_level: LevelFilter,
    pub log_to: LogDestination,
    pub engine: EngineSettings,
    pub core: CoreConfig,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: FileConfig) -> Result<Self> {
        let engine_defaults = EngineSettings::default();
        let reconnect_defaults = ReconnectPolicy::default();
        let tab_defaults = TabPolicy::default();

        let log_level = match cli.log_level.or(file.log_level) {
            Some(raw) => raw
                .parse::<LevelFilter>()
                .with_context(|| format!("invalid log level {raw:?}"))?,
            None => LevelFilter::Info,
        };

        let engine = EngineSettings {
            base_url: cli
                .base_url
                .or(file.base_url)
                .unwrap_or(engine_defaults.base_url),
            token: cli.token.or(file.token).filter(|token| !token.is_empty()),
            connect_timeout: file
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(engine_defaults.connect_timeout),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(engine_defaults.request_timeout),
            idle_timeout: file
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(engine_defaults.idle_timeout),
            reconnect: ReconnectPolicy {
                max_attempts: file
                    .max_reconnect_attempts
                    .unwrap_or(reconnect_defaults.max_attempts),
                initial_backoff: file
                    .initial_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(reconnect_defaults.initial_backoff),
                max_backoff: file
                    .max_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(reconnect_defaults.max_backoff),
            },
        };

        let core = CoreConfig {
            tab_policy: TabPolicy {
                auto_close_delay_ms: file
                    .auto_close_delay_ms
                    .unwrap_or(tab_defaults.auto_close_delay_ms),
                transient_agent_patterns: file
                    .transient_agent_patterns
                    .unwrap_or(tab_defaults.transient_agent_patterns),
            },
        };

        Ok(Self {
            workspace: cli.workspace.or(file.workspace),
            session: cli.session.or(file.session),
            state_dir: cli
                .state_dir
                .or(file.state_dir)
                .unwrap_or_else(|| PathBuf::from(".workspace")),
            log_level,
            log_to: cli.log_to.or(file.log_to).unwrap_or(LogDestination::File),
            engine,
            core,
        })
    }
}
