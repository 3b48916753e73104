//! Chat session coordinator
//!
//! Handles one inbound user message end to end: history bookkeeping, prompt
//! assembly, the observable agent run, and the relay events a client sees
//! while the run progresses. Every accepted message ends in exactly one
//! relayed assistant message, successful or not.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agent_runner::{
    run_observable, AgentCapability, AgentError, AgentEvent, Observation, RunOptions, StepEvent,
};
use relay_core::document::{DocumentStore, Record, RecordKind};
use relay_core::{
    render_transcript, ChatMessage, ConversationStore, InboundMessage, PromptBuilder,
};

use crate::config::{ServerConfig, DEFAULT_TOOL_OUTPUT_CAP};
use crate::events::{truncate_output, RelayEvent, ToolExecutionEvent, ToolStatus};
use crate::relay::Relay;

pub const THOUGHT_ANALYZING: &str = "Analyzing your message...";
pub const THOUGHT_PROCESSING: &str = "Processing results...";
pub const STORE_FAILURE_REPLY: &str =
    "Sorry, I couldn't save our conversation just now. Please try again.";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub timeout: Option<Duration>,
    /// Max characters of tool output relayed to clients
    pub tool_output_cap: usize,
    pub prompt: PromptBuilder,
    /// Save a transcript summary when a session ends
    pub archive_on_disconnect: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            tool_output_cap: DEFAULT_TOOL_OUTPUT_CAP,
            prompt: PromptBuilder::default(),
            archive_on_disconnect: true,
        }
    }
}

impl From<&ServerConfig> for CoordinatorConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            timeout: config.agent_timeout,
            tool_output_cap: config.tool_output_cap,
            prompt: PromptBuilder::new(config.history_window),
            archive_on_disconnect: config.archive_on_disconnect,
        }
    }
}

pub struct ChatCoordinator {
    store: Arc<dyn ConversationStore>,
    relay: Arc<dyn Relay>,
    agent: Arc<dyn AgentCapability>,
    documents: Option<Arc<dyn DocumentStore>>,
    config: CoordinatorConfig,
}

impl ChatCoordinator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        relay: Arc<dyn Relay>,
        agent: Arc<dyn AgentCapability>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            relay,
            agent,
            documents: None,
            config,
        }
    }

    /// Archive transcripts of ending sessions into `documents`
    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Handle one inbound message and return the assistant reply.
    ///
    /// Fails only if the message is rejected before anything is touched
    /// (validation). Agent and store failures become assistant replies.
    pub async fn handle_message(
        &self,
        session_id: &str,
        inbound: InboundMessage,
    ) -> relay_core::Result<ChatMessage> {
        let user_message = inbound.validate(session_id)?;
        let chat_id = user_message.id.clone();

        let history = match self.store.get_or_create(session_id).await {
            Ok(history) => history,
            Err(e) => {
                error!(session_id = %session_id, chat_id = %chat_id, error = %e, "Failed to open session");
                return Ok(self.finish_turn(session_id, STORE_FAILURE_REPLY).await);
            }
        };

        // Turns of one session run strictly one after another.
        let _turn = history.begin_turn().await;
        info!(session_id = %session_id, chat_id = %chat_id, "Handling message");

        self.relay.emit(session_id, RelayEvent::typing(true)).await;

        let content = match self.record_user_message(session_id, user_message).await {
            Ok(prompt) => match self.run_agent(session_id, &chat_id, prompt).await {
                Ok(answer) => answer,
                Err(err) => {
                    if matches!(err, AgentError::NoFinishEvent) {
                        error!(
                            session_id = %session_id,
                            chat_id = %chat_id,
                            "Agent run closed without a terminal event"
                        );
                    } else {
                        warn!(session_id = %session_id, chat_id = %chat_id, error = %err, "Agent run failed");
                    }
                    failure_reply(&err)
                }
            },
            Err(e) => {
                error!(session_id = %session_id, chat_id = %chat_id, error = %e, "Conversation store failed");
                STORE_FAILURE_REPLY.to_string()
            }
        };

        let reply = self.finish_turn(session_id, content).await;
        debug!(session_id = %session_id, chat_id = %chat_id, "Message handled");
        Ok(reply)
    }

    /// Snapshot the history for the prompt, then append the user message
    async fn record_user_message(
        &self,
        session_id: &str,
        user_message: ChatMessage,
    ) -> relay_core::Result<String> {
        let snapshot = self.store.history_of(session_id).await?;
        let prompt = self
            .config
            .prompt
            .build(&user_message.content, &snapshot);
        self.store.append_existing(session_id, user_message).await?;
        Ok(prompt)
    }

    /// Persist the assistant reply, stop typing and relay the reply
    async fn finish_turn(&self, session_id: &str, content: impl Into<String>) -> ChatMessage {
        let reply = ChatMessage::assistant(content);
        match self.store.append_existing(session_id, reply.clone()).await {
            Ok(true) => {}
            Ok(false) => debug!(session_id = %session_id, "Session ended before the reply was stored"),
            Err(e) => error!(session_id = %session_id, error = %e, "Failed to store reply"),
        }

        self.relay.emit(session_id, RelayEvent::typing(false)).await;
        self.relay
            .emit(session_id, RelayEvent::Response(reply.clone()))
            .await;
        reply
    }

    /// Run the agent, relaying its progress live. Returns the answer text.
    async fn run_agent(
        &self,
        session_id: &str,
        chat_id: &str,
        prompt: String,
    ) -> agent_runner::Result<String> {
        self.relay
            .emit(session_id, RelayEvent::thinking(chat_id, THOUGHT_ANALYZING))
            .await;

        let options = RunOptions {
            timeout: self.config.timeout,
            ..RunOptions::default()
        };
        let mut events = run_observable(Arc::clone(&self.agent), prompt, options)?;

        while let Some(event) = events.next().await {
            match event {
                AgentEvent::Step(step) => self.relay_step(session_id, chat_id, step).await,
                AgentEvent::Finish(finish) => return Ok(finish.output_text()),
                AgentEvent::Error(failure) => return Err(failure.into()),
            }
        }

        Err(AgentError::NoFinishEvent)
    }

    async fn relay_step(&self, session_id: &str, chat_id: &str, step: StepEvent) {
        let id = match &step.call_id {
            Some(call_id) => format!("{}-{}", chat_id, call_id),
            None => Uuid::new_v4().to_string(),
        };
        let (status, output) = match &step.observation {
            Observation::Pending => (ToolStatus::Running, None),
            Observation::Output(text) => (
                ToolStatus::Completed,
                Some(truncate_output(text, self.config.tool_output_cap)),
            ),
            Observation::Failed(text) => (
                ToolStatus::Error,
                Some(truncate_output(text, self.config.tool_output_cap)),
            ),
        };
        debug!(session_id = %session_id, tool = %step.tool_name, ?status, "Relaying tool step");

        let thought = match status {
            ToolStatus::Running => format!("Using tool: {}", step.tool_name),
            _ => THOUGHT_PROCESSING.to_string(),
        };
        let tool_event = ToolExecutionEvent {
            id,
            chat_id: chat_id.to_string(),
            tool: step.tool_name,
            input: step.tool_input,
            status,
            output,
            timestamp: Utc::now().timestamp_millis(),
        };

        self.relay.emit(session_id, RelayEvent::Tool(tool_event)).await;
        self.relay
            .emit(session_id, RelayEvent::thinking(chat_id, thought))
            .await;
    }

    /// End a session after a graceful disconnect.
    ///
    /// Archives the transcript when configured, then evicts the session.
    pub async fn end_session(&self, session_id: &str) {
        if self.config.archive_on_disconnect {
            if let Some(documents) = &self.documents {
                self.archive(documents.as_ref(), session_id).await;
            }
        }

        if let Err(e) = self.store.remove(session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to remove session");
        }
    }

    async fn archive(&self, documents: &dyn DocumentStore, session_id: &str) {
        let messages = match self.store.history_of(session_id).await {
            Ok(messages) if !messages.is_empty() => messages,
            Ok(_) => return,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to read history for archive");
                return;
            }
        };

        let record = Record::new(RecordKind::Summary, render_transcript(&messages))
            .with_session(session_id)
            .with_tags(vec!["transcript".to_string()]);
        match documents.save(record).await {
            Ok(id) => info!(session_id = %session_id, record_id = %id, "Transcript archived"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to archive transcript"),
        }
    }
}

/// User-facing description of a failed run
fn failure_reply(err: &AgentError) -> String {
    match err {
        AgentError::Timeout { millis } => format!(
            "Sorry, I couldn't finish answering: the agent timed out after {} ms. Please try again.",
            millis
        ),
        AgentError::Capability { cause } => format!(
            "Sorry, something went wrong while answering: {}. Please try again.",
            cause
        ),
        _ => "Sorry, something went wrong while answering. Please try again.".to_string(),
    }
}
