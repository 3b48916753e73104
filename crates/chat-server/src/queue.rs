//! Per-socket inbound message queue
//!
//! Every `chat:message` of a socket is pushed onto one queue and handled by a
//! single worker task, so a session's messages are processed in the order the
//! transport delivered them. Closing the queue stops the worker after the
//! message in flight; the worker then ends the session, so nothing handled
//! for the socket can outlive its disconnect.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use relay_core::InboundMessage;

use crate::events::{ErrorPayload, CHAT_ERROR};
use crate::relay::EventChannel;
use crate::state::AppState;

#[derive(Clone)]
pub struct SessionQueue {
    tx: mpsc::UnboundedSender<Value>,
    closed: Arc<Notify>,
}

impl SessionQueue {
    /// Start the worker for `session_id`. Rejections are answered on
    /// `replies`.
    pub fn spawn(
        session_id: String,
        state: AppState,
        replies: Arc<dyn EventChannel>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(Notify::new());
        let worker = tokio::spawn(run_worker(session_id, state, replies, rx, closed.clone()));
        (Self { tx, closed }, worker)
    }

    /// Queue a raw `chat:message` payload
    pub fn push(&self, data: Value) {
        if self.tx.send(data).is_err() {
            debug!("Session worker stopped, message dropped");
        }
    }

    /// Stop taking messages and end the session once the current one is done
    pub fn close(&self) {
        self.closed.notify_one();
    }
}

async fn run_worker(
    session_id: String,
    state: AppState,
    replies: Arc<dyn EventChannel>,
    mut rx: mpsc::UnboundedReceiver<Value>,
    closed: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = closed.notified() => break,
            next = rx.recv() => match next {
                Some(data) => handle_chat_message(&session_id, &state, replies.as_ref(), data).await,
                None => break,
            },
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        info!(session_id = %session_id, dropped, "Discarded messages queued before disconnect");
    }

    state.coordinator().end_session(&session_id).await;
}

async fn handle_chat_message(
    session_id: &str,
    state: &AppState,
    replies: &dyn EventChannel,
    data: Value,
) {
    let inbound = match serde_json::from_value::<InboundMessage>(data) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Malformed chat message");
            emit_error(replies, format!("Malformed message: {}", e));
            return;
        }
    };

    match state.coordinator().handle_message(session_id, inbound).await {
        Ok(reply) => debug!(session_id = %session_id, reply_id = %reply.id, "Reply sent"),
        Err(relay_core::Error::Validation(e)) => {
            warn!(session_id = %session_id, error = %e, "Rejected chat message");
            emit_error(replies, e.to_string());
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to handle chat message");
            emit_error(replies, "The message could not be processed".to_string());
        }
    }
}

fn emit_error(replies: &dyn EventChannel, message: String) {
    let payload = match serde_json::to_value(ErrorPayload { message }) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode error payload: {}", e);
            return;
        }
    };
    if let Err(e) = replies.send(CHAT_ERROR, &payload) {
        debug!("Failed to emit chat error: {}", e);
    }
}
