//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to manage sessions and streams without sending messages
//! to the API.

use crate::types::{Session, SessionId};

/// A parsed chat command.
///
/// These commands control the chat and are not sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Regenerate the reply to the last user message.
    Redo,

    /// Start a new session, optionally titled.
    New(Option<String>),

    /// List sessions.
    Sessions,

    /// Switch to a session.
    Load(SessionSelector),

    /// Delete a session.
    Delete(SessionSelector),

    /// Rename the current session.
    Title(String),

    /// Find sessions by title or content.
    Search(String),

    /// Attach a file to the next message.
    Attach(String),

    /// Clear the current session's messages.
    Clear,

    /// Change the model, or show it when no name is given.
    Model(Option<String>),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics (message count, current model, etc.).
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Names a session either by its position in the `/sessions` list or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelector {
    /// One-based position in the session list.
    Index(usize),
    /// Session id.
    Id(String),
}

impl SessionSelector {
    fn parse(argument: &str) -> Self {
        match argument.parse::<usize>() {
            Ok(index) => SessionSelector::Index(index),
            Err(_) => SessionSelector::Id(argument.to_string()),
        }
    }

    /// Find the session this selector names.
    pub fn resolve(&self, sessions: &[Session]) -> Option<SessionId> {
        match self {
            SessionSelector::Index(index) => index
                .checked_sub(1)
                .and_then(|i| sessions.get(i))
                .map(|session| session.id.clone()),
            SessionSelector::Id(id) => sessions
                .iter()
                .find(|session| session.id.as_str() == id)
                .map(|session| session.id.clone()),
        }
    }
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use chatstream::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/load 2").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "redo" | "retry" => ChatCommand::Redo,
        "new" => ChatCommand::New(argument.map(|s| s.to_string())),
        "sessions" | "ls" => ChatCommand::Sessions,
        "load" | "switch" => match argument {
            Some(arg) => ChatCommand::Load(SessionSelector::parse(arg)),
            None => ChatCommand::Invalid("/load requires a session number or id".to_string()),
        },
        "delete" | "rm" => match argument {
            Some(arg) => ChatCommand::Delete(SessionSelector::parse(arg)),
            None => ChatCommand::Invalid("/delete requires a session number or id".to_string()),
        },
        "title" => match argument {
            Some(arg) => ChatCommand::Title(arg.to_string()),
            None => ChatCommand::Invalid("/title requires a title".to_string()),
        },
        "search" => ChatCommand::Search(argument.unwrap_or_default().to_string()),
        "attach" => match argument {
            Some(arg) => ChatCommand::Attach(arg.to_string()),
            None => ChatCommand::Invalid("/attach requires a file path".to_string()),
        },
        "clear" => ChatCommand::Clear,
        "model" => ChatCommand::Model(argument.map(|s| s.to_string())),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /redo                  Regenerate the last reply
  /new [title]           Start a new session
  /sessions              List sessions
  /load <n|id>           Switch to a session
  /delete <n|id>         Delete a session
  /title <text>          Rename the current session
  /search <query>        Find sessions by title or content
  /attach <path>         Attach an image or PDF to the next message
  /clear                 Clear the current session
  /model [name]          Show or change the model
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a reply is streaming to stop it."#
}
