//! Error types for agent-runner

use thiserror::Error;

/// Result type alias for agent runs
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while running an agent
#[derive(Debug, Error)]
pub enum AgentError {
    /// Prompt text was empty
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// The agent capability (or a tool it called) failed
    #[error("Agent failed: {cause}")]
    Capability { cause: String },

    /// The agent call exceeded its deadline
    #[error("Agent timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// The event stream closed without a terminal event
    #[error("Agent run ended without a finish event")]
    NoFinishEvent,

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<AgentError>,
    },

    /// A stage could not extract its output from the finish event
    #[error("Stage '{stage}' could not extract output: {message}")]
    Extraction { stage: String, message: String },
}

impl AgentError {
    /// Wrap an error with the name of the stage it came from
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            // Already attributed by an inner stage
            err @ (Self::StageFailed { .. } | Self::Extraction { .. }) => err,
            err => Self::StageFailed {
                stage: stage.into(),
                source: Box::new(err),
            },
        }
    }
}

/// Rejection raised by an agent or tool capability
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CapabilityError {
    pub message: String,
}

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for CapabilityError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CapabilityError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
