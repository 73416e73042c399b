use super::{check_key, ActionExecution, ArtifactStore, ExecutionHistory};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory object store backed by a `BTreeMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `list` has been called.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        check_key(key)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// In-memory execution history.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: RwLock<Vec<ActionExecution>>,
}

impl MemoryHistory {
    pub fn new(records: Vec<ActionExecution>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn record(&self, execution: ActionExecution) {
        self.records.write().await.push(execution);
    }
}

#[async_trait]
impl ExecutionHistory for MemoryHistory {
    async fn action_executions(
        &self,
        _pipeline: &str,
        execution_id: &str,
    ) -> StorageResult<Vec<ActionExecution>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.pipeline_execution_id == execution_id)
            .cloned()
            .collect())
    }
}
