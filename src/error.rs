// src/error.rs

//! Unified error handling for the bot.

use std::fmt;

use thiserror::Error;

/// Result type alias for bot operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Persistence failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Chat entity could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// A command was invoked without a required argument
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// A tracked URL failed its acceptance probe
    #[error("Probe failed for {url}: {message}")]
    Probe { url: String, message: String },

    /// A page could not be fetched
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The chat platform refused a message
    #[error("Publish error for channel {channel}: {message}")]
    Publish { channel: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a missing-parameter error.
    pub fn missing(parameter: impl Into<String>) -> Self {
        Self::MissingParameter(parameter.into())
    }

    /// Create a probe error with context.
    pub fn probe(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Probe {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error with context.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a publish error with context.
    pub fn publish(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Publish {
            channel: channel.into(),
            message: message.to_string(),
        }
    }
}

/// Errors produced by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The `(server, url)` pair is already tracked.
    #[error("URL is already tracked for this server")]
    AlreadyTracked,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The connection lock was poisoned by a panicking writer.
    #[error("Database connection lock poisoned")]
    Poisoned,

    /// The blocking database task did not complete.
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
