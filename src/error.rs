//! Error types for queue operations

use thiserror::Error;

use crate::types::EntryId;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the queue client, stores and recovery routines
#[derive(Error, Debug)]
pub enum QueueError {
    /// Client configuration is missing or malformed (not retried)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport or command failure from the Redis backend
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stream key does not exist
    #[error("No such stream '{0}'")]
    NoStream(String),

    /// The consumer group does not exist on the stream
    #[error("No consumer group '{group}' on stream '{stream}'")]
    NoGroup { stream: String, group: String },

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    /// A single-instance routine found its lease already taken
    #[error("Lease '{key}' is held by another instance")]
    LeaseHeld { key: String },

    /// The drain handler rejected an entry; it stays pending
    #[error("Handler failed on entry {id}: {source}")]
    Handler {
        id: EntryId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Store reply could not be interpreted
    #[error("Unexpected store reply: {0}")]
    Protocol(String),
}

/// Configuration-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("you must configure the stream")]
    MissingStream,

    #[error("you must configure the server")]
    MissingServer,

    /// Server is not `host:port[:auth]`
    #[error("invalid server address '{0}', expected host:port[:auth]")]
    InvalidServer(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
