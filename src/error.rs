//! Error types for issue-bot.

use crate::message::MessageId;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Authentication failed for {username}: {reason}")]
    Auth { username: String, reason: String },

    #[error("Folder {folder} could not be selected: {reason}")]
    Folder { folder: String, reason: String },

    #[error("Unseen search failed: {0}")]
    Search(String),

    #[error("Fetch of message {id} failed: {reason}")]
    Fetch { id: MessageId, reason: String },

    #[error("Flagging message {id} as seen failed: {reason}")]
    Store { id: MessageId, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Malformed MIME structure: {0}")]
    Parse(String),

    #[error("Failed to decode plain-text part: {0}")]
    Decode(String),
}

/// Issue tracker errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Request to {repo} failed: {reason}")]
    Request { repo: String, reason: String },

    #[error("Tracker rejected issue for {repo} with status {status}: {body}")]
    Status {
        repo: String,
        status: u16,
        body: String,
    },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
