//! Storage contracts the aggregation step relies on.
//!
//! Two seams, both async and backend-agnostic:
//! - [`ArtifactStore`]: the shared object store every scan action uploads to.
//! - [`ExecutionHistory`]: per-action status records of a pipeline run.
//!
//! In-memory implementations live in [`memory`]; [`local`] and [`history`]
//! back the CLI with a directory tree and a JSON history export.

pub mod history;
pub mod local;
pub mod memory;

pub use history::JsonHistoryFile;
pub use local::LocalDirStore;
pub use memory::{MemoryHistory, MemoryStore};

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared object store, addressed by `/`-separated keys.
///
/// Every writer writes a distinct key; there is no locking.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Status of one action execution as reported by the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    InProgress,
    Abandoned,
    Unknown(String),
}

impl ActionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ActionStatus::Succeeded => "Succeeded",
            ActionStatus::Failed => "Failed",
            ActionStatus::InProgress => "InProgress",
            ActionStatus::Abandoned => "Abandoned",
            ActionStatus::Unknown(other) => other,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Succeeded)
    }
}

impl From<String> for ActionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Succeeded" => ActionStatus::Succeeded,
            "Failed" => ActionStatus::Failed,
            "InProgress" => ActionStatus::InProgress,
            "Abandoned" => ActionStatus::Abandoned,
            _ => ActionStatus::Unknown(value),
        }
    }
}

impl From<ActionStatus> for String {
    fn from(status: ActionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an execution's action history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecution {
    pub pipeline_execution_id: String,
    pub stage_name: String,
    pub action_name: String,
    pub status: ActionStatus,
}

/// Per-action execution records of pipeline runs.
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    async fn action_executions(
        &self,
        pipeline: &str,
        execution_id: &str,
    ) -> StorageResult<Vec<ActionExecution>>;
}

/// Reject keys that are empty, absolute or escape their prefix.
pub(crate) fn check_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
