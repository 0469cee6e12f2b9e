//! Line-oriented input: plain text sends a message, `/` starts a command.

use thiserror::Error;
use workspace_core::Msg;

pub const HELP: &str = "\
commands:
  <text>                    send a message
  /stop <job>               stop a running job
  /resume <job>             reconnect a job whose connection was lost
  /regen <message>          regenerate an assistant reply
  /edit <message> <text>    replace a user message
  /redo <message> <text>    replace a user message and resubmit
  /variant <message> <n>    show reply variant n (0-based)
  /tab <tab>                select a tab
  /close <tab>              close a tab
  /help                     show this help
  /quit                     exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Msg),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command /{0}; try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("variant index must be a number, got {0:?}")]
    BadIndex(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Dispatch(Msg::SendMessage {
            text: line.to_string(),
            kind: None,
        })));
    };

    let (name, args) = split_word(rest);
    let command = match name {
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "stop" => Command::Dispatch(Msg::StopJob {
            job_id: single(args, "/stop <job>")?,
        }),
        "resume" => Command::Dispatch(Msg::ResumeJob {
            job_id: single(args, "/resume <job>")?,
        }),
        "regen" => Command::Dispatch(Msg::Regenerate {
            message_id: single(args, "/regen <message>")?,
        }),
        "edit" | "redo" => {
            let usage = if name == "redo" {
                "/redo <message> <text>"
            } else {
                "/edit <message> <text>"
            };
            let (message_id, content) = split_word(args);
            if message_id.is_empty() || content.is_empty() {
                return Err(CommandError::Usage(usage));
            }
            Command::Dispatch(Msg::EditMessage {
                message_id: message_id.to_string(),
                content: content.to_string(),
                redo: name == "redo",
            })
        }
        "variant" => {
            let (message_id, index) = split_word(args);
            if message_id.is_empty() || index.is_empty() {
                return Err(CommandError::Usage("/variant <message> <index>"));
            }
            let index = index
                .parse::<usize>()
                .map_err(|_| CommandError::BadIndex(index.to_string()))?;
            Command::Dispatch(Msg::SelectVariant {
                message_id: message_id.to_string(),
                index,
            })
        }
        "tab" => Command::Dispatch(Msg::SelectTab {
            tab_id: single(args, "/tab <tab>")?,
        }),
        "close" => Command::Dispatch(Msg::CloseTab {
            tab_id: single(args, "/close <tab>")?,
        }),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

/// Tab ids may contain spaces (file paths), so the whole remainder is the argument.
fn single(args: &str, usage: &'static str) -> Result<String, CommandError> {
    let args = args.trim();
    if args.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(args.to_string())
}
