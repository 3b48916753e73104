//! HTTP worker agent
//!
//! Posts the prompt to a remote agent worker and translates its server-sent
//! event stream into [`RunObserver`] notifications.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::capability::{AgentCapability, InvokeOutput, RunObserver};
use crate::error::CapabilityError;
use crate::event::Observation;
use crate::tools::output_text;

#[derive(Serialize)]
struct InvokeRequest<'a> {
    prompt: &'a str,
}

/// One `data:` frame of the worker's event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerFrame {
    ToolStart {
        #[serde(default)]
        call_id: Option<String>,
        tool: String,
        #[serde(default)]
        input: Value,
    },
    ToolEnd {
        #[serde(default)]
        call_id: Option<String>,
        tool: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        output: Value,
    },
    ToolError {
        #[serde(default)]
        call_id: Option<String>,
        tool: String,
        #[serde(default)]
        input: Value,
        error: String,
    },
    Complete {
        #[serde(default)]
        output: Map<String, Value>,
    },
    Error {
        message: String,
    },
}

/// Agent capability served by a remote worker over HTTP
#[derive(Debug, Clone)]
pub struct WorkerAgent {
    client: Client,
    url: String,
}

impl WorkerAgent {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            // Disable proxy for internal worker communication
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AgentCapability for WorkerAgent {
    async fn invoke(
        &self,
        prompt: &str,
        observer: RunObserver,
    ) -> Result<InvokeOutput, CapabilityError> {
        let endpoint = format!("{}/invoke", self.url);
        info!("Sending prompt to agent worker: {}", endpoint);

        let res = self
            .client
            .post(&endpoint)
            .json(&InvokeRequest { prompt })
            .send()
            .await
            .map_err(|e| CapabilityError::new(format!("Failed to connect to worker: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_default();
            return Err(CapabilityError::new(format!(
                "Worker returned {}: {}",
                status, error_text
            )));
        }

        let mut stream = res.bytes_stream();
        let mut buffer = BytesMut::new();

        while let Some(item) = stream.next().await {
            let chunk: Bytes =
                item.map_err(|e| CapabilityError::new(format!("Stream error: {}", e)))?;
            buffer.extend_from_slice(&chunk);

            for frame in drain_frames(&mut buffer) {
                if let Some(outcome) = apply_frame(&observer, frame) {
                    return outcome;
                }
            }
        }

        Err(CapabilityError::new(
            "Worker stream ended without a completion",
        ))
    }
}

/// Remove every complete `\n\n`-terminated event from `buffer` and parse it.
///
/// Frames are decoded only once complete, so a character split across network
/// chunks stays intact.
fn drain_frames(buffer: &mut BytesMut) -> Vec<WorkerFrame> {
    let mut frames = Vec::new();
    while let Some(idx) = buffer.windows(2).position(|pair| pair == b"\n\n") {
        let raw = buffer.split_to(idx + 2);
        let msg = match std::str::from_utf8(&raw) {
            Ok(msg) => msg.trim(),
            Err(e) => {
                debug!(error = %e, "Skipping worker frame with invalid UTF-8");
                continue;
            }
        };

        let Some(data) = msg.strip_prefix("data: ") else {
            continue;
        };
        match serde_json::from_str::<WorkerFrame>(data) {
            Ok(frame) => frames.push(frame),
            Err(e) => debug!(error = %e, "Skipping unrecognised worker frame"),
        }
    }
    frames
}

/// Forward a frame to the observer. Returns the invocation outcome for
/// terminal frames.
fn apply_frame(
    observer: &RunObserver,
    frame: WorkerFrame,
) -> Option<Result<InvokeOutput, CapabilityError>> {
    match frame {
        WorkerFrame::ToolStart {
            call_id,
            tool,
            input,
        } => {
            observer.on_step_start(call_id, tool, input);
            None
        }
        WorkerFrame::ToolEnd {
            call_id,
            tool,
            input,
            output,
        } => {
            observer.on_step_end(call_id, tool, input, Observation::Output(output_text(&output)));
            None
        }
        WorkerFrame::ToolError {
            call_id,
            tool,
            input,
            error,
        } => {
            observer.on_step_end(call_id, tool, input, Observation::Failed(error));
            None
        }
        WorkerFrame::Complete { output } => Some(Ok(Some(output))),
        WorkerFrame::Error { message } => Some(Err(CapabilityError::new(message))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RunNotification;
    use serde_json::json;

    #[test]
    fn test_drain_frames_keeps_partial_tail() {
        let mut buffer = BytesMut::from(
            "data: {\"type\":\"tool_start\",\"call_id\":\"c1\",\"tool\":\"get_weather\",\"input\":{\"city\":\"Paris\"}}\n\n\
             : keep-alive\n\n\
             data: {\"type\":\"tool_end\",\"call_id\":\"c1\",\"tool\":\"get_weather\",\"output\":\"18",
        );

        let frames = drain_frames(&mut buffer);

        assert_eq!(
            frames,
            vec![WorkerFrame::ToolStart {
                call_id: Some("c1".to_string()),
                tool: "get_weather".to_string(),
                input: json!({"city": "Paris"}),
            }]
        );
        assert!(buffer.starts_with(b"data: {\"type\":\"tool_end\""));

        buffer.extend_from_slice("°C\"}\n\n".as_bytes());
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_frames_skips_unknown_types() {
        let mut buffer = BytesMut::from(
            "data: {\"type\":\"log\",\"content\":\"warming up\"}\n\n\
             data: {\"type\":\"error\",\"message\":\"rate limited\"}\n\n",
        );

        let frames = drain_frames(&mut buffer);
        assert_eq!(
            frames,
            vec![WorkerFrame::Error {
                message: "rate limited".to_string()
            }]
        );
    }

    #[test]
    fn test_drain_frames_character_split_across_chunks() {
        let frame = "data: {\"type\":\"tool_end\",\"call_id\":\"c1\",\"tool\":\"get_weather\",\"output\":\"18°C\"}\n\n";
        let bytes = frame.as_bytes();
        // Cut between the two bytes of the degree sign
        let cut = frame.find('°').unwrap() + 1;

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&bytes[..cut]);
        assert!(drain_frames(&mut buffer).is_empty());

        buffer.extend_from_slice(&bytes[cut..]);
        let frames = drain_frames(&mut buffer);
        assert_eq!(
            frames,
            vec![WorkerFrame::ToolEnd {
                call_id: Some("c1".to_string()),
                tool: "get_weather".to_string(),
                input: Value::Null,
                output: json!("18°C"),
            }]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_apply_frame_translates_notifications() {
        let (observer, mut rx) = RunObserver::channel();

        assert!(apply_frame(
            &observer,
            WorkerFrame::ToolError {
                call_id: None,
                tool: "web_search".to_string(),
                input: json!({"q": "news"}),
                error: "quota exceeded".to_string(),
            },
        )
        .is_none());

        match rx.try_recv().unwrap() {
            RunNotification::StepEnded { observation, .. } => {
                assert_eq!(observation, Observation::Failed("quota exceeded".to_string()));
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[test]
    fn test_apply_frame_terminal_outcomes() {
        let (observer, _rx) = RunObserver::channel();

        let done = apply_frame(
            &observer,
            WorkerFrame::Complete {
                output: match json!({"output": "done"}) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                },
            },
        );
        let output = done.unwrap().unwrap().unwrap();
        assert_eq!(output["output"], "done");

        let failed = apply_frame(
            &observer,
            WorkerFrame::Error {
                message: "rate limited".to_string(),
            },
        );
        assert_eq!(failed.unwrap().unwrap_err().message, "rate limited");
    }

    #[tokio::test]
    async fn test_unreachable_worker_rejects() {
        let agent = WorkerAgent::new("http://127.0.0.1:1/");
        assert_eq!(agent.url(), "http://127.0.0.1:1");

        let (observer, _rx) = RunObserver::channel();
        let err = agent.invoke("hello", observer).await.unwrap_err();
        assert!(err.message.contains("Failed to connect to worker"));
    }
}
