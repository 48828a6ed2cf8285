//! Parsing of the lines typed into the driver.

use thiserror::Error;

use ephchat_shared::{PermissionState, ThreadId};

use crate::config::parse_permission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Plain text: send it.
    Send(String),
    Threads,
    Select(ThreadId),
    /// Delete the given thread, or the active one.
    Delete(Option<ThreadId>),
    Sweep,
    Reconnect,
    Visible(bool),
    Permission(PermissionState),
    ResetDevice,
    Messages,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: /{0} (try /help)")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument for /{command}: {value}")]
    InvalidArgument { command: &'static str, value: String },
}

pub const HELP: &str = "\
Commands:
  <text>                      send a message
  /threads                    list threads (admin)
  /select <name>              switch to a thread (admin)
  /delete [name]              delete a thread (admin)
  /messages                   show the current thread
  /sweep                      remove expired messages now
  /reconnect                  re-subscribe after a connection loss
  /visible on|off             mark the app as visible or in the background
  /permission granted|denied  record the notification permission
  /reset-device               forget admin status of this device
  /status                     show session state
  /quit                       leave";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<CliCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(CliCommand::Send(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let thread_arg = || (!arg.is_empty()).then(|| ThreadId::from_display_name(arg));

    let command = match name {
        "threads" => CliCommand::Threads,
        "select" => CliCommand::Select(thread_arg().ok_or(ParseError::MissingArgument("thread name"))?),
        "delete" => CliCommand::Delete(thread_arg()),
        "sweep" => CliCommand::Sweep,
        "reconnect" => CliCommand::Reconnect,
        "visible" => match arg {
            "on" => CliCommand::Visible(true),
            "off" => CliCommand::Visible(false),
            _ => {
                return Err(ParseError::InvalidArgument {
                    command: "visible",
                    value: arg.to_string(),
                })
            }
        },
        "permission" => CliCommand::Permission(parse_permission(arg).ok_or_else(|| {
            ParseError::InvalidArgument {
                command: "permission",
                value: arg.to_string(),
            }
        })?),
        "reset-device" => CliCommand::ResetDevice,
        "messages" => CliCommand::Messages,
        "status" => CliCommand::Status,
        "help" => CliCommand::Help,
        "quit" | "exit" => CliCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

/// Whether a confirmation answer means yes.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
