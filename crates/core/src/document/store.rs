use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{Record, RecordQuery};
use super::DocumentStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RecordsFile {
    records: Vec<Record>,
}

/// JSON-file document store
///
/// Records are cached in memory and the whole file is rewritten on each save.
pub struct FileDocumentStore {
    path: PathBuf,
    records: RwLock<Vec<Record>>,
}

async fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await?;
    Ok(())
}

impl FileDocumentStore {
    /// Open the store at `path`, loading existing records if the file exists
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<RecordsFile>(&bytes)?.records,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        debug!("Loaded {} records from {:?}", records.len(), path);

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn save(&self, record: Record) -> Result<String> {
        if record.content.trim().is_empty() {
            return Err(Error::InvalidInput("Record content is required".to_string()));
        }

        let mut records = self.records.write().await;
        let id = record.id.clone();

        // Memory only takes the record once it is on disk
        let mut candidate = records.clone();
        candidate.push(record);
        let file = RecordsFile { records: candidate };
        write_json_pretty(&self.path, &file)
            .await
            .map_err(|err| Error::Storage(format!("Failed to persist records: {}", err)))?;

        *records = file.records;
        Ok(id)
    }

    async fn find(&self, query: &RecordQuery, limit: usize) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        // Insertion order breaks timestamp ties, newest first.
        let mut matched: Vec<(usize, &Record)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| query.matches(record))
            .collect();
        matched.sort_by(|(left_idx, left), (right_idx, right)| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right_idx.cmp(left_idx))
        });

        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
