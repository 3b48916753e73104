//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Rejection of a malformed inbound message.
///
/// Raised before any state is touched; never turned into a chat message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Message is missing a session id")]
    MissingSessionId,

    #[error("Unexpected role for an inbound message: {0}")]
    UnexpectedRole(String),
}
