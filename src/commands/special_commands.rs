//! Special commands parser for interactive chat mode
//!
//! Special commands manage sessions and the active model rather than being
//! sent as generation prompts. They are prefixed with `/`; the command word
//! is case-insensitive while arguments (model ids) keep their case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session and make it active
    NewSession,

    /// List sessions with their index, title, and pending state
    ListSessions,

    /// Switch to the session at this 1-based index
    SwitchSession(usize),

    /// Delete the session at this 1-based index, or the active one
    DeleteSession(Option<usize>),

    /// Cancel the active session's pending generation
    Cancel,

    /// Use a different model for new generations
    SwitchModel(String),

    /// Print the active session's messages
    History,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; treat the input as a prompt
    None,
}

fn parse_index(command: &str, arg: &str) -> Result<usize, CommandError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        }),
    }
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/` command,
/// `CommandError::MissingArgument` when a required argument is absent, and
/// `CommandError::UnsupportedArgument` for a malformed argument.
///
/// # Examples
///
/// ```
/// use fallab::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewSession);
/// assert_eq!(parse_special_command("/switch 2").unwrap(), SpecialCommand::SwitchSession(2));
/// assert_eq!(
///     parse_special_command("/model fal-ai/flux/dev").unwrap(),
///     SpecialCommand::SwitchModel("fal-ai/flux/dev".to_string())
/// );
/// assert_eq!(parse_special_command("a cat on a mat").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match (command.as_str(), arg) {
        ("/new", "") => Ok(SpecialCommand::NewSession),
        ("/sessions", "") | ("/list", "") => Ok(SpecialCommand::ListSessions),

        ("/switch", "") => Err(CommandError::MissingArgument {
            command: "/switch".to_string(),
            usage: "/switch <n>".to_string(),
        }),
        ("/switch", n) => parse_index("/switch", n).map(SpecialCommand::SwitchSession),

        ("/delete", "") => Ok(SpecialCommand::DeleteSession(None)),
        ("/delete", n) => parse_index("/delete", n).map(|n| SpecialCommand::DeleteSession(Some(n))),

        ("/cancel", "") => Ok(SpecialCommand::Cancel),

        ("/model", "") => Err(CommandError::MissingArgument {
            command: "/model".to_string(),
            usage: "/model <model_id>".to_string(),
        }),
        ("/model", model) => Ok(SpecialCommand::SwitchModel(model.to_string())),

        ("/history", "") => Ok(SpecialCommand::History),
        ("/help", "") | ("/?", "") => Ok(SpecialCommand::Help),
        ("exit", "") | ("quit", "") | ("/exit", "") | ("/quit", "") => Ok(SpecialCommand::Exit),

        (
            "/new" | "/sessions" | "/list" | "/cancel" | "/history" | "/help" | "/?" | "/exit"
            | "/quit",
            extra,
        ) => Err(CommandError::UnsupportedArgument {
            command: command.clone(),
            arg: extra.to_string(),
        }),

        _ => Err(CommandError::UnknownCommand(command.clone())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

SESSIONS:
  /new            - Start a new chat session
  /sessions       - List sessions (pending generations are marked)
  /switch <n>     - Switch to session number n
  /delete [n]     - Delete session n, or the active session

GENERATION:
  /cancel         - Stop waiting for the active session's generation
  /model <id>     - Use a different model for new prompts
  /history        - Show the active session's messages

OTHER:
  /help           - Show this help
  /exit, exit     - Leave chat mode

Anything else is sent as a generation prompt.
"#
    );
}
