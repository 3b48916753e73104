//! Core library for the agent chat relay
//!
//! This crate contains the conversation-side building blocks:
//! - Chat messages and inbound validation
//! - Per-session conversation history
//! - Prompt assembly
//! - Document persistence (facts, notes, summaries)

pub mod document;
pub mod error;
pub mod message;
pub mod prompt;
pub mod session;

pub use error::{Error, ValidationError};
pub use message::{ChatMessage, InboundMessage, MessageRole};
pub use prompt::{build_prompt, render_transcript, PromptBuilder, DEFAULT_HISTORY_WINDOW};
pub use session::{ConversationHistory, ConversationStore, SessionId, SessionStore};

pub type Result<T> = std::result::Result<T, Error>;
