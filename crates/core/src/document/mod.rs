//! Document persistence for facts, notes and conversation summaries

pub mod store;
pub mod types;

use async_trait::async_trait;

use crate::Result;

pub use store::FileDocumentStore;
pub use types::{Record, RecordKind, RecordQuery};

/// Simple async document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a record and return its id
    async fn save(&self, record: Record) -> Result<String>;

    /// Records matching `query`, newest first, at most `limit` of them
    async fn find(&self, query: &RecordQuery, limit: usize) -> Result<Vec<Record>>;
}
