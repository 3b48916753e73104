//! Per-session conversation state
//!
//! A session owns exactly one [`ConversationHistory`]. Histories are created
//! lazily on the first message and evicted when the transport reports a
//! disconnect. Nothing here survives a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::message::ChatMessage;
use crate::Result;

/// Opaque session identifier derived from the transport connection
pub type SessionId = String;

/// Ordered, append-only conversation of one session (newest last).
///
/// Appends on the same history are serialized by its own lock; appends on
/// different histories never contend.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: RwLock<Vec<ChatMessage>>,
    turn: Arc<Mutex<()>>,
}

impl ConversationHistory {

    /// Append a message. No length bound is applied here.
    pub async fn append(&self, message: ChatMessage) {
        self.messages.write().await.push(message);
    }

    /// Snapshot of the full transcript in conversation order
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Wait for exclusive use of this conversation for one turn.
    ///
    /// The lock is fair, so turns are granted in the order they were requested.
    pub async fn begin_turn(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.turn).lock_owned().await
    }
}

/// Storage interface for conversation histories
///
/// The contract tolerates an implementation backed by real I/O, hence the
/// fallible async signatures.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Get the history for a session, creating it if the id is unseen
    async fn get_or_create(&self, session_id: &str) -> Result<Arc<ConversationHistory>>;

    /// Append a message to a session's history, creating the session if needed
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()>;

    /// Append a message only while the session is live. Returns `false`, and
    /// leaves the store untouched, once the session has been removed.
    async fn append_existing(&self, session_id: &str, message: ChatMessage) -> Result<bool>;

    /// Drop a session. Removing an unknown session is a no-op.
    async fn remove(&self, session_id: &str) -> Result<()>;

    /// Ordered history of a session, empty if the session does not exist
    async fn history_of(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Number of live sessions
    async fn session_count(&self) -> usize;
}

/// In-memory conversation store
///
/// The outer map lock is only held for lookup and insertion; message writes
/// go through each history's own lock.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<ConversationHistory>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup(&self, session_id: &str) -> Option<Arc<ConversationHistory>> {
        self.sessions.read().await.get(session_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for SessionStore {
    async fn get_or_create(&self, session_id: &str) -> Result<Arc<ConversationHistory>> {
        if let Some(history) = self.lookup(session_id).await {
            return Ok(history);
        }

        let mut sessions = self.sessions.write().await;
        let history = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, "Creating conversation history");
                Arc::new(ConversationHistory::default())
            })
            .clone();
        Ok(history)
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()> {
        let history = self.get_or_create(session_id).await?;
        history.append(message).await;
        Ok(())
    }

    async fn append_existing(&self, session_id: &str, message: ChatMessage) -> Result<bool> {
        match self.lookup(session_id).await {
            Some(history) => {
                history.append(message).await;
                Ok(true)
            }
            None => {
                debug!(session_id, "Dropped append for a removed session");
                Ok(false)
            }
        }
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        if self.sessions.write().await.remove(session_id).is_some() {
            info!(session_id, "Removed conversation history");
        } else {
            debug!(session_id, "Remove requested for unknown session");
        }
        Ok(())
    }

    async fn history_of(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        match self.lookup(session_id).await {
            Some(history) => Ok(history.messages().await),
            None => Ok(Vec::new()),
        }
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_or_create_returns_same_history() {
        let store = SessionStore::new();

        let first = store.get_or_create("s1").await.unwrap();
        let second = store.get_or_create("s1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionStore::new();

        store.append("s1", ChatMessage::user("one")).await.unwrap();
        store.append("s1", ChatMessage::assistant("two")).await.unwrap();

        let history = store.history_of("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "one");
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].content, "two");
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_session() {
        let store = Arc::new(SessionStore::new());
        let m1 = ChatMessage::user("m1");
        let m2 = ChatMessage::user("m2");

        let a = {
            let store = Arc::clone(&store);
            let m1 = m1.clone();
            tokio::spawn(async move { store.append("s1", m1).await })
        };
        let b = {
            let store = Arc::clone(&store);
            let m2 = m2.clone();
            tokio::spawn(async move { store.append("s1", m2).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let history = store.history_of("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.contains(&m1));
        assert!(history.contains(&m2));
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_many_sessions_in_parallel() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();

        for session in 0..16 {
            for turn in 0..8 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    let id = format!("s{}", session);
                    store
                        .append(&id, ChatMessage::user(format!("{}", turn)))
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.session_count().await, 16);
        for session in 0..16 {
            let history = store.history_of(&format!("s{}", session)).await.unwrap();
            assert_eq!(history.len(), 8);
        }
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        store.append("s1", ChatMessage::user("hi")).await.unwrap();

        store.remove("s1").await.unwrap();
        assert!(store.history_of("s1").await.unwrap().is_empty());

        store.remove("s1").await.unwrap();
        store.remove("never-seen").await.unwrap();
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_detached_history_does_not_resurrect_session() {
        let store = SessionStore::new();
        let history = store.get_or_create("s1").await.unwrap();

        store.remove("s1").await.unwrap();
        history.append(ChatMessage::assistant("late")).await;

        assert_eq!(store.session_count().await, 0);
        assert_eq!(history.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_existing_never_creates() {
        let store = SessionStore::new();

        let appended = store
            .append_existing("s1", ChatMessage::user("early"))
            .await
            .unwrap();
        assert!(!appended);
        assert_eq!(store.session_count().await, 0);

        store.get_or_create("s1").await.unwrap();
        assert!(store
            .append_existing("s1", ChatMessage::user("hi"))
            .await
            .unwrap());

        store.remove("s1").await.unwrap();
        assert!(!store
            .append_existing("s1", ChatMessage::assistant("late"))
            .await
            .unwrap());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_busy_session_does_not_block_others() {
        let store = SessionStore::new();
        let busy = store.get_or_create("s1").await.unwrap();
        let _turn = busy.begin_turn().await;

        let other = tokio::time::timeout(Duration::from_millis(100), async {
            let history = store.get_or_create("s2").await.unwrap();
            let _other_turn = history.begin_turn().await;
            store.append("s2", ChatMessage::user("hi")).await.unwrap();
            store
                .append_existing("s2", ChatMessage::assistant("hello"))
                .await
                .unwrap()
        })
        .await;
        assert_eq!(other.ok(), Some(true));

        // The busy session still accepts plain appends
        let appended = tokio::time::timeout(
            Duration::from_millis(100),
            store.append("s1", ChatMessage::user("queued")),
        )
        .await;
        assert!(appended.is_ok());
        assert_eq!(store.history_of("s2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_turns_are_exclusive() {
        let store = SessionStore::new();
        let history = store.get_or_create("s1").await.unwrap();

        let guard = history.begin_turn().await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), history.begin_turn()).await;
        assert!(blocked.is_err());

        drop(guard);
        let next = tokio::time::timeout(Duration::from_millis(50), history.begin_turn()).await;
        assert!(next.is_ok());
    }
}
