//! Chat command surface.
//!
//! Messages like `?addurl <url>` are parsed into a [`Command`] and executed
//! by the [`CommandHandler`], which keeps the store and the in-memory state
//! in step.

mod handler;

pub use handler::{CommandContext, CommandHandler};

use crate::error::{AppError, Result};

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddUrl(String),
    RemoveUrl(String),
    ListUrls,
    Notify(String),
    Unnotify(String),
    ViewNotify,
    /// Bind the output channel; `None` binds the invoking channel
    SetChannel(Option<String>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddUrl(_) => "addurl",
            Self::RemoveUrl(_) => "removeurl",
            Self::ListUrls => "listurls",
            Self::Notify(_) => "notify",
            Self::Unnotify(_) => "unnotify",
            Self::ViewNotify => "viewnotify",
            Self::SetChannel(_) => "setchannel",
        }
    }
}

/// Parse a chat message.
///
/// Returns `Ok(None)` for messages without `prefix` and for unknown
/// commands. `notify` and `unnotify` take the rest of the line as the
/// keyword; other arguments are single words.
pub fn parse(prefix: &str, text: &str) -> Result<Option<Command>> {
    let Some(body) = text.trim_start().strip_prefix(prefix) else {
        return Ok(None);
    };

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let first_word = rest.split_whitespace().next();

    let command = match name {
        "addurl" => Command::AddUrl(required(first_word, "url")?),
        "removeurl" => Command::RemoveUrl(required(first_word, "url")?),
        "listurls" => Command::ListUrls,
        "notify" => Command::Notify(required(Some(rest), "keyword")?),
        "unnotify" => Command::Unnotify(required(Some(rest), "keyword")?),
        "viewnotify" => Command::ViewNotify,
        "setchannel" => Command::SetChannel(first_word.map(str::to_string)),
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn required(value: Option<&str>, parameter: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::missing(parameter)),
    }
}
