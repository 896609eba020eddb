//! Slash commands understood by `smartasset-chat`.
//!
//! Input starting with `/` controls the client; anything else is sent as a
//! message.

use crate::types::SessionId;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Sign in; the password is prompted for separately.
    Login(String),

    /// Create an account and sign in.
    Register {
        email: String,
        full_name: Option<String>,
    },

    /// Sign out.
    Logout,

    /// Show the signed-in identity.
    WhoAmI,

    /// List sessions.
    Sessions,

    /// Make a session active.
    Select(SessionId),

    /// Start an unsaved new chat.
    New,

    /// Delete a session.
    Delete(SessionId),

    /// Rename a session.
    Rename { id: SessionId, title: String },

    /// Reload the session list.
    Reload,

    /// Toggle streamed replies.
    Stream(bool),

    Help,

    Quit,

    /// A command that did not parse; carries the message to show.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use smartasset::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/select 7"), Some(ChatCommand::Select(7)));
/// assert!(parse_command("How much should I save each month?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "login" => match argument {
            Some(email) if !email.contains(char::is_whitespace) => {
                ChatCommand::Login(email.to_string())
            }
            _ => ChatCommand::Invalid("/login requires an email".to_string()),
        },
        "register" => match argument {
            Some(arg) => {
                let mut parts = arg.splitn(2, char::is_whitespace);
                let email = parts.next().unwrap_or_default().to_string();
                let full_name = parts
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from);
                ChatCommand::Register { email, full_name }
            }
            None => ChatCommand::Invalid("/register requires an email".to_string()),
        },
        "logout" => ChatCommand::Logout,
        "whoami" | "me" => ChatCommand::WhoAmI,
        "sessions" | "ls" => ChatCommand::Sessions,
        "select" | "open" => parse_id_command(argument, ChatCommand::Select, "/select"),
        "new" => ChatCommand::New,
        "delete" | "rm" => parse_id_command(argument, ChatCommand::Delete, "/delete"),
        "rename" => parse_rename(argument),
        "reload" => ChatCommand::Reload,
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_id_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(SessionId) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<SessionId>() {
            Ok(value) => constructor(value),
            Err(_) => ChatCommand::Invalid(format!("{} expects a session id", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a session id", name)),
    }
}

fn parse_rename(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/rename requires a session id and a title".to_string());
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or_default();
    let Ok(id) = id.parse::<SessionId>() else {
        return ChatCommand::Invalid("/rename expects a session id".to_string());
    };
    match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(title) => ChatCommand::Rename {
            id,
            title: title.to_string(),
        },
        None => ChatCommand::Invalid("/rename requires a title".to_string()),
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// One line per command, for `/help`.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /login <email>               Sign in (prompts for the password)
  /register <email> [name]     Create an account and sign in
  /logout                      Sign out
  /whoami                      Show the signed-in account
  /sessions                    List your chats
  /select <id>                 Open a chat
  /new                         Start a new chat
  /delete <id>                 Delete a chat
  /rename <id> <title>         Rename a chat
  /reload                      Reload the chat list
  /stream on|off               Stream replies as they are written
  /help                        Show this help message
  /quit                        Exit
Anything else is sent as a message."#
}
