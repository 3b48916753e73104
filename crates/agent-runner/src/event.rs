//! Event types for observable agent runs
//!
//! A run emits zero or more [`AgentEvent::Step`] events followed by exactly
//! one terminal event, either [`AgentEvent::Finish`] or [`AgentEvent::Error`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

/// Outcome of a tool call as far as the run has observed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Observation {
    /// The call has started and no result is known yet
    Pending,
    /// The tool returned output
    Output(String),
    /// The tool failed with an error message
    Failed(String),
}

impl Observation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Observed text, if the call has ended
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Pending => None,
            Self::Output(text) | Self::Failed(text) => Some(text),
        }
    }
}

/// One tool invocation, either its start (`Pending`) or its end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    /// Correlation id shared by the start and end of the same call, when the
    /// capability supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub tool_name: String,
    pub tool_input: Value,
    pub observation: Observation,
    /// Timestamp in milliseconds
    pub timestamp: i64,
}

impl StepEvent {
    pub fn new(
        call_id: Option<String>,
        tool_name: impl Into<String>,
        tool_input: Value,
        observation: Observation,
    ) -> Self {
        Self {
            call_id,
            tool_name: tool_name.into(),
            tool_input,
            observation,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Successful end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishEvent {
    pub output: Map<String, Value>,
}

impl FinishEvent {
    pub fn new(output: Map<String, Value>) -> Self {
        Self { output }
    }

    /// The final answer as text.
    ///
    /// Uses the `output` key when present (as-is for strings, JSON-encoded
    /// otherwise) and falls back to the whole output map as JSON.
    pub fn output_text(&self) -> String {
        match self.output.get("output") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => Value::Object(self.output.clone()).to_string(),
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The capability rejected
    Capability,
    /// The capability did not settle before the deadline
    Timeout { millis: u64 },
}

/// Failed end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub cause: String,
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl ErrorEvent {
    pub fn capability(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            kind: FailureKind::Capability,
        }
    }

    pub fn timeout(millis: u64) -> Self {
        Self {
            cause: format!("timed out after {} ms", millis),
            kind: FailureKind::Timeout { millis },
        }
    }
}

impl From<ErrorEvent> for AgentError {
    fn from(event: ErrorEvent) -> Self {
        match event.kind {
            FailureKind::Capability => AgentError::Capability { cause: event.cause },
            FailureKind::Timeout { millis } => AgentError::Timeout { millis },
        }
    }
}

/// Events emitted by an observable agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool call started or ended
    Step(StepEvent),
    /// The run completed
    Finish(FinishEvent),
    /// The run failed
    Error(ErrorEvent),
}

impl AgentEvent {
    /// Check if the event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish(_) | Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finish(output: Value) -> FinishEvent {
        match output {
            Value::Object(map) => FinishEvent::new(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_output_text_prefers_output_string() {
        let event = finish(json!({"output": "It's 18°C in Paris."}));
        assert_eq!(event.output_text(), "It's 18°C in Paris.");
    }

    #[test]
    fn test_output_text_encodes_non_string() {
        let event = finish(json!({"output": {"temp": 18}}));
        assert_eq!(event.output_text(), r#"{"temp":18}"#);

        let event = finish(json!({"answer": 42}));
        assert_eq!(event.output_text(), r#"{"answer":42}"#);
    }

    #[test]
    fn test_terminal_events() {
        let step = AgentEvent::Step(StepEvent::new(
            None,
            "get_weather",
            json!({"city": "Paris"}),
            Observation::Pending,
        ));
        let error = AgentEvent::Error(ErrorEvent::capability("rate limited"));

        assert!(!step.is_terminal());
        assert!(error.is_terminal());
        assert!(AgentEvent::Finish(FinishEvent::default()).is_terminal());
    }

    #[test]
    fn test_step_serialization() {
        let step = AgentEvent::Step(StepEvent::new(
            Some("call-1".to_string()),
            "get_weather",
            json!({"city": "Paris"}),
            Observation::Output("18°C".to_string()),
        ));
        let json = serde_json::to_value(&step).unwrap();

        assert_eq!(json["type"], "step");
        assert_eq!(json["toolName"], "get_weather");
        assert_eq!(json["callId"], "call-1");
        assert_eq!(json["observation"]["status"], "output");
        assert_eq!(json["observation"]["value"], "18°C");
    }

    #[test]
    fn test_error_event_converts_to_agent_error() {
        let timeout: AgentError = ErrorEvent::timeout(250).into();
        assert!(matches!(timeout, AgentError::Timeout { millis: 250 }));

        let failed: AgentError = ErrorEvent::capability("rate limited").into();
        assert!(failed.to_string().contains("rate limited"));

        let json = serde_json::to_value(AgentEvent::Error(ErrorEvent::timeout(250))).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["millis"], 250);
    }
}
