use std::io::{self, BufRead};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use workspace_core::{update, AppState, Msg, RestoreSnapshot, DEFAULT_WORKSPACE};
use workspace_engine::{ensure_state_dir, EngineHandle};
use workspace_logging::{ws_debug, ws_info};

use super::commands::{parse_command, Command, HELP};
use super::config::{AppConfig, Cli};
use super::effects::{EffectRunner, TerminalNotifier};
use super::logging;
use super::persistence::{SessionRecord, StateStore};
use super::render::render;

/// How long the loop waits on engine events before checking input again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run_app() -> Result<()> {
    let config = AppConfig::from_cli(Cli::parse())?;
    ensure_state_dir(&config.state_dir).with_context(|| {
        format!("preparing state directory {}", config.state_dir.display())
    })?;
    logging::initialize(config.log_level, config.log_to, &config.state_dir);
    ws_info!(
        "starting workspace client base_url={} state_dir={:?}",
        config.engine.base_url,
        config.state_dir
    );

    let store = StateStore::new(config.state_dir.clone());
    let snapshot = initial_snapshot(&config, &store);
    let engine = EngineHandle::new(config.engine.clone()).context("starting engine")?;
    let runner = EffectRunner::new(engine, store, Box::new(TerminalNotifier));

    let mut app = App::new(AppState::with_config(config.core.clone()), runner);
    app.dispatch(Msg::Restore(snapshot));
    println!("type a message, or /help for commands");

    let lines = spawn_input_reader();
    loop {
        match lines.try_recv() {
            Ok(line) => match parse_command(&line) {
                Ok(Some(Command::Dispatch(msg))) => app.dispatch(msg),
                Ok(Some(Command::Help)) => println!("{HELP}"),
                Ok(Some(Command::Quit)) => break,
                Ok(None) => {}
                Err(err) => println!("! {err}"),
            },
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if let Some(msg) = app.runner.next_event(POLL_INTERVAL) {
            app.dispatch(msg);
        }
        for msg in app.runner.drain_events() {
            app.dispatch(msg);
        }
    }

    ws_info!("exiting; active jobs stay registered for the next start");
    Ok(())
}

/// Chooses workspace and session (flags first, then the stored session)
/// and loads the persisted jobs and transcript for them.
fn initial_snapshot(config: &AppConfig, store: &StateStore) -> RestoreSnapshot {
    let stored = store.load_session();
    let workspace_id = config
        .workspace
        .clone()
        .or_else(|| stored.as_ref().map(|s| s.workspace_id.clone()))
        .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    let session_id = config
        .session
        .clone()
        .or_else(|| {
            stored
                .filter(|s| s.workspace_id == workspace_id)
                .map(|s| s.session_id)
        })
        .unwrap_or_else(|| workspace_id.clone());

    RestoreSnapshot {
        jobs: store.load_jobs(),
        messages: store.load_messages(&workspace_id),
        workspace_id,
        session_id,
    }
}

fn spawn_input_reader() -> mpsc::Receiver<String> {
    let (line_tx, line_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    line_rx
}

struct App {
    state: AppState,
    runner: EffectRunner,
    saved_session: Option<SessionRecord>,
}

impl App {
    fn new(state: AppState, runner: EffectRunner) -> Self {
        Self {
            state,
            runner,
            saved_session: None,
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        let was_dirty = state.consume_dirty();
        self.state = state;
        self.runner.run(effects);

        if was_dirty {
            for line in render(&self.state.view()) {
                println!("{line}");
            }
        }
        self.save_session_if_changed();
    }

    fn save_session_if_changed(&mut self) {
        let session = SessionRecord {
            workspace_id: self.state.workspace_id().to_string(),
            session_id: self.state.session_id().to_string(),
            current_job: self.state.current_job().map(ToOwned::to_owned),
        };
        if self.saved_session.as_ref() != Some(&session) {
            ws_debug!("session changed; current_job={:?}", session.current_job);
            self.runner.store().save_session(&session);
            self.saved_session = Some(session);
        }
    }
}
