//! The opaque agent capability and the notification handle it reports through

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::error::CapabilityError;
use crate::event::Observation;
use crate::tools::{output_text, Tool};

/// Final result of an invocation, if the capability returns one directly
pub type InvokeOutput = Option<Map<String, Value>>;

/// A black-box agent: given a prompt it may call tools any number of times
/// and eventually completes or fails.
///
/// Implementations report progress through the [`RunObserver`]. Completion may
/// be signalled through [`RunObserver::on_complete`], through the returned
/// output, or both; the adapter emits a single finish either way.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        observer: RunObserver,
    ) -> Result<InvokeOutput, CapabilityError>;
}

/// Notifications pushed by a capability while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum RunNotification {
    StepStarted {
        call_id: Option<String>,
        tool: String,
        input: Value,
    },
    StepEnded {
        call_id: Option<String>,
        tool: String,
        input: Value,
        observation: Observation,
    },
    Completed {
        output: Map<String, Value>,
    },
}

/// Cloneable handle a capability uses to report tool calls and completion.
///
/// Sends never block and never fail from the capability's point of view; if
/// nobody is listening any more the notification is dropped.
#[derive(Debug, Clone)]
pub struct RunObserver {
    tx: mpsc::UnboundedSender<RunNotification>,
}

impl RunObserver {
    pub fn new(tx: mpsc::UnboundedSender<RunNotification>) -> Self {
        Self { tx }
    }

    /// Create an observer together with the receiving end of its notifications
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn notify(&self, notification: RunNotification) {
        if self.tx.send(notification).is_err() {
            trace!("Run notification dropped, observer closed");
        }
    }

    /// A tool call started
    pub fn on_step_start(&self, call_id: Option<String>, tool: impl Into<String>, input: Value) {
        self.notify(RunNotification::StepStarted {
            call_id,
            tool: tool.into(),
            input,
        });
    }

    /// A tool call ended
    pub fn on_step_end(
        &self,
        call_id: Option<String>,
        tool: impl Into<String>,
        input: Value,
        observation: Observation,
    ) {
        self.notify(RunNotification::StepEnded {
            call_id,
            tool: tool.into(),
            input,
            observation,
        });
    }

    /// The run is complete
    pub fn on_complete(&self, output: Map<String, Value>) {
        self.notify(RunNotification::Completed { output });
    }

    /// Invoke a tool, reporting its start and end under a fresh correlation id
    pub async fn call_tool(
        &self,
        tool: &dyn Tool,
        input: Value,
    ) -> Result<Value, CapabilityError> {
        let call_id = Some(Uuid::new_v4().to_string());
        self.on_step_start(call_id.clone(), tool.name(), input.clone());

        let result = tool.invoke(input.clone()).await;
        let observation = match &result {
            Ok(output) => Observation::Output(output_text(output)),
            Err(err) => Observation::Failed(err.message.clone()),
        };
        self.on_step_end(call_id, tool.name(), input, observation);

        result
    }
}
