//! Relay: delivers typed events to a session's transport channel

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use socketioxide::extract::SocketRef;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::events::RelayEvent;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to encode {event} payload: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to deliver {event}: {message}")]
    Delivery { event: &'static str, message: String },
}

/// Delivers relay events to sessions.
///
/// Delivery is best effort: events for a session without a live channel are
/// dropped and delivery failures are never reported to the caller.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn emit(&self, session_id: &str, event: RelayEvent);
}

/// One live transport channel
pub trait EventChannel: Send + Sync {
    fn send(&self, event: &'static str, payload: &Value) -> Result<(), RelayError>;
}

impl EventChannel for SocketRef {
    fn send(&self, event: &'static str, payload: &Value) -> Result<(), RelayError> {
        self.emit(event, payload).map_err(|e| RelayError::Delivery {
            event,
            message: e.to_string(),
        })
    }
}

/// Relay over a registry of session channels
#[derive(Default)]
pub struct ChannelRelay {
    channels: RwLock<HashMap<String, Arc<dyn EventChannel>>>,
}

impl ChannelRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the channel of a session, replacing any previous one
    pub async fn register(&self, session_id: impl Into<String>, channel: Arc<dyn EventChannel>) {
        let session_id = session_id.into();
        info!(session_id = %session_id, "Channel registered");
        self.channels.write().await.insert(session_id, channel);
    }

    pub async fn unregister(&self, session_id: &str) {
        if self.channels.write().await.remove(session_id).is_some() {
            info!(session_id = %session_id, "Channel unregistered");
        }
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn deliver(&self, session_id: &str, event: &RelayEvent) -> Result<(), RelayError> {
        let Some(channel) = self.channels.read().await.get(session_id).cloned() else {
            debug!(session_id = %session_id, event = event.name(), "No channel, event dropped");
            return Ok(());
        };

        let payload = event.payload().map_err(|source| RelayError::Encode {
            event: event.name(),
            source,
        })?;
        channel.send(event.name(), &payload)
    }
}

#[async_trait]
impl Relay for ChannelRelay {
    async fn emit(&self, session_id: &str, event: RelayEvent) {
        if let Err(e) = self.deliver(session_id, &event).await {
            debug!(session_id = %session_id, error = %e, "Relay delivery failed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ClosedChannel, RecordingChannel};
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_registered_channel() {
        let relay = ChannelRelay::new();
        let channel = Arc::new(RecordingChannel::default());
        relay.register("s1", channel.clone()).await;

        relay.emit("s1", RelayEvent::typing(true)).await;
        relay.emit("s2", RelayEvent::typing(true)).await;

        let events = channel.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "chat:typing");
        assert_eq!(events[0].1["isTyping"], true);
    }

    #[tokio::test]
    async fn test_emit_after_unregister_is_noop() {
        let relay = ChannelRelay::new();
        let channel = Arc::new(RecordingChannel::default());
        relay.register("s1", channel.clone()).await;
        assert_eq!(relay.channel_count().await, 1);

        relay.unregister("s1").await;
        relay.unregister("s1").await;
        relay.emit("s1", RelayEvent::thinking("m1", "Analyzing your message...")).await;

        assert!(channel.events().is_empty());
        assert_eq!(relay.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let relay = ChannelRelay::new();
        relay.register("s1", Arc::new(ClosedChannel)).await;

        relay.emit("s1", RelayEvent::typing(false)).await;

        let err = relay
            .deliver("s1", &RelayEvent::typing(false))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Delivery { event: "chat:typing", .. }));
    }
}
