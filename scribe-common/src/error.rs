//! Common error types for the scribe service

use thiserror::Error;

/// Common result type for scribe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the scribe workspace
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model gateway failure after the retry budget is exhausted
    #[error("Model gateway error: {0}")]
    Gateway(String),

    /// Streaming answer aborted before the end-of-stream marker
    #[error("Stream aborted: {0}")]
    StreamAborted(String),

    /// Vector index failure
    #[error("Vector index error: {0}")]
    Vector(String),

    /// Task queue rejected or abandoned an operation
    #[error("Queue error: {0}")]
    Queue(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
