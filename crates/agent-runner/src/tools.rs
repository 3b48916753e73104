//! Tool capabilities
//!
//! Tools are named capabilities taking JSON input and producing string or
//! JSON output. Concrete tools live outside this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CapabilityError;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as referenced by the agent
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, input: Value) -> Result<Value, CapabilityError>;
}

/// Render tool output as observation text
pub fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{RunNotification, RunObserver};
    use crate::event::Observation;
    use serde_json::json;

    struct Weather;

    #[async_trait]
    impl Tool for Weather {
        fn name(&self) -> &str {
            "get_weather"
        }

        async fn invoke(&self, input: Value) -> Result<Value, CapabilityError> {
            match input["city"].as_str() {
                Some("Paris") => Ok(json!("18°C")),
                Some(city) => Err(CapabilityError::new(format!("unknown city: {}", city))),
                None => Err(CapabilityError::new("city is required")),
            }
        }
    }

    #[test]
    fn test_output_text() {
        assert_eq!(output_text(&json!("plain")), "plain");
        assert_eq!(output_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_call_tool_reports_correlated_steps() {
        let (observer, mut rx) = RunObserver::channel();

        let output = observer
            .call_tool(&Weather, json!({"city": "Paris"}))
            .await
            .unwrap();
        assert_eq!(output, json!("18°C"));

        let started = rx.recv().await.unwrap();
        let ended = rx.recv().await.unwrap();
        match (started, ended) {
            (
                RunNotification::StepStarted { call_id: start_id, tool, .. },
                RunNotification::StepEnded { call_id: end_id, observation, .. },
            ) => {
                assert_eq!(tool, "get_weather");
                assert!(start_id.is_some());
                assert_eq!(start_id, end_id);
                assert_eq!(observation, Observation::Output("18°C".to_string()));
            }
            other => panic!("unexpected notifications: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_tool_reports_failure() {
        let (observer, mut rx) = RunObserver::channel();

        let result = observer.call_tool(&Weather, json!({"city": "Oslo"})).await;
        assert!(result.is_err());

        let _started = rx.recv().await.unwrap();
        match rx.recv().await.unwrap() {
            RunNotification::StepEnded { observation, .. } => {
                assert_eq!(
                    observation,
                    Observation::Failed("unknown city: Oslo".to_string())
                );
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }
}
