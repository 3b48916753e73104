//! Socket.IO event handlers
//!
//! Each socket is one chat session; its id is the session id. The socket is
//! registered as the session's relay channel for as long as it is connected,
//! and its chat messages go through one [`SessionQueue`].

use std::sync::Arc;

use serde_json::Value;
use socketioxide::extract::{Data, SocketRef, State};
use socketioxide::{SocketIo, TransportType};
use tracing::{info, warn};

use crate::events::{HistoryPayload, CHAT_HISTORY, CHAT_MESSAGE};
use crate::queue::SessionQueue;
use crate::state::AppState;

/// Handle new socket connection
pub async fn on_connect(socket: SocketRef, State(state): State<AppState>) {
    let session_id = socket.id.to_string();
    info!(session_id = %session_id, "Client connected");

    // The channel exists before any message can produce relay events
    state
        .relay()
        .register(session_id.clone(), Arc::new(socket.clone()))
        .await;

    let (queue, _worker) =
        SessionQueue::spawn(session_id, state.clone(), Arc::new(socket.clone()));

    // Sync handlers run inline in packet order; the queue keeps that order.
    let inbox = queue.clone();
    socket.on(CHAT_MESSAGE, move |Data(data): Data<Value>| {
        inbox.push(data);
    });

    socket.on(
        CHAT_HISTORY,
        |socket: SocketRef, State(state): State<AppState>| async move {
            handle_history(socket, state).await;
        },
    );

    socket.on_disconnect(
        move |socket: SocketRef, State(state): State<AppState>| async move {
            let session_id = socket.id.to_string();
            info!(session_id = %session_id, "Client disconnected");
            state.relay().unregister(&session_id).await;
            queue.close();
        },
    );
}

async fn handle_history(socket: SocketRef, state: AppState) {
    let session_id = socket.id.to_string();
    let messages = match state.coordinator().store().history_of(&session_id).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Failed to read history");
            Vec::new()
        }
    };

    let response = HistoryPayload {
        session_id,
        messages,
    };
    if let Err(e) = socket.emit(CHAT_HISTORY, &response) {
        warn!("Failed to emit history: {}", e);
    }
}

/// Create and configure Socket.IO layer
pub fn create_socket_layer(state: AppState) -> (socketioxide::layer::SocketIoLayer, SocketIo) {
    let (layer, io) = SocketIo::builder()
        .with_state(state)
        // Only allow WebSocket transport to avoid CORS issues with polling
        .transports([TransportType::Websocket])
        .build_layer();

    io.ns("/", on_connect);

    (layer, io)
}
