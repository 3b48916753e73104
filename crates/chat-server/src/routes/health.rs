//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    active_sessions: usize,
    connected_channels: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.coordinator().store().session_count().await,
        connected_channels: state.relay().channel_count().await,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{ChatCoordinator, CoordinatorConfig};
    use crate::relay::testing::RecordingChannel;
    use crate::relay::ChannelRelay;
    use agent_runner::WorkerAgent;
    use relay_core::{ChatMessage, ConversationStore, SessionStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_reports_counts() {
        let store = Arc::new(SessionStore::new());
        store.append("s1", ChatMessage::user("hi")).await.unwrap();
        let relay = Arc::new(ChannelRelay::new());
        relay
            .register("s1", Arc::new(RecordingChannel::default()))
            .await;
        relay
            .register("s2", Arc::new(RecordingChannel::default()))
            .await;

        let coordinator = ChatCoordinator::new(
            store,
            relay.clone(),
            Arc::new(WorkerAgent::new("http://localhost:4000")),
            CoordinatorConfig::default(),
        );
        let state = AppState::new(coordinator, relay);

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_sessions, 1);
        assert_eq!(health.connected_channels, 2);
    }
}
