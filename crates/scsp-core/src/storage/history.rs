use super::{ActionExecution, ExecutionHistory};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListActionExecutions {
    #[serde(default)]
    action_execution_details: Vec<ActionExecution>,
}

/// Parse the output of `list-action-executions`.
pub fn parse_action_executions(content: &str) -> StorageResult<Vec<ActionExecution>> {
    serde_json::from_str::<ListActionExecutions>(content)
        .map(|doc| doc.action_execution_details)
        .map_err(|e| StorageError::History(e.to_string()))
}

/// Execution history exported to a JSON file.
#[derive(Debug, Clone)]
pub struct JsonHistoryFile {
    path: PathBuf,
}

impl JsonHistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ExecutionHistory for JsonHistoryFile {
    async fn action_executions(
        &self,
        _pipeline: &str,
        execution_id: &str,
    ) -> StorageResult<Vec<ActionExecution>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::Io {
                key: self.path.display().to_string(),
                source: e,
            })?;
        Ok(parse_action_executions(&content)?
            .into_iter()
            .filter(|r| r.pipeline_execution_id == execution_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ActionStatus;

    const SAMPLE: &str = r#"{
        "actionExecutionDetails": [
            {
                "pipelineExecutionId": "exec-1",
                "actionExecutionId": "a1",
                "pipelineVersion": 1,
                "stageName": "validate",
                "actionName": "Bandit",
                "status": "Succeeded"
            },
            {
                "pipelineExecutionId": "exec-1",
                "stageName": "validate",
                "actionName": "Tfsec",
                "status": "Failed"
            }
        ]
    }"#;

    #[test]
    fn test_parse_ignores_extra_fields() {
        let records = parse_action_executions(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, ActionStatus::Failed);
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(matches!(
            parse_action_executions("not json"),
            Err(StorageError::History(_))
        ));
    }

    #[tokio::test]
    async fn test_file_history_filters_execution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let history = JsonHistoryFile::new(&path);
        assert_eq!(history.action_executions("p", "exec-1").await.unwrap().len(), 2);
        assert!(history.action_executions("p", "exec-2").await.unwrap().is_empty());
    }
}
