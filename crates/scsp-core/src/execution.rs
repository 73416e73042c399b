use serde::{Deserialize, Serialize};
use std::fmt;

/// Root folder for all scan output in the artifact bucket.
pub const RESULTS_ROOT: &str = "scan_results";

/// The per-execution prefix as seen from inside a build container, where the
/// correlation key arrives through `START_TIME` and `PIPELINE_RUN_ID`.
pub const SHELL_PREFIX: &str = "scan_results/${START_TIME}-execution-$PIPELINE_RUN_ID";

/// Environment variables every validate action receives.
pub const RUN_ID_VAR: &str = "PIPELINE_RUN_ID";
pub const START_TIME_VAR: &str = "START_TIME";
pub const RUN_ID_SOURCE: &str = "#{codepipeline.PipelineExecutionId}";
pub const START_TIME_SOURCE: &str = "#{SourceVariables.CommitterDate}";

/// Execution correlation key: the (start-time, execution-id) pair that
/// namespaces every object written during one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionKey {
    pub start_time: String,
    pub execution_id: String,
}

impl ExecutionKey {
    pub fn new(start_time: impl Into<String>, execution_id: impl Into<String>) -> Option<Self> {
        let key = Self {
            start_time: start_time.into(),
            execution_id: execution_id.into(),
        };
        let valid = |s: &str| !s.trim().is_empty() && !s.contains('/');
        (valid(&key.start_time) && valid(&key.execution_id)).then_some(key)
    }

    /// `scan_results/<start-time>-execution-<execution-id>/`
    pub fn prefix(&self) -> String {
        format!(
            "{}/{}-execution-{}/",
            RESULTS_ROOT, self.start_time, self.execution_id
        )
    }

    pub fn log_key(&self, action: &str) -> String {
        format!("{}{}", self.prefix(), log_file_name(action))
    }

    pub fn archive_key(&self, repo: &str, branch: &str) -> String {
        format!("{}{}", self.prefix(), archive_file_name(repo, branch))
    }

    pub fn summary_key(&self, repo: &str, branch: &str) -> String {
        format!("{}{}", self.prefix(), summary_file_name(repo, branch))
    }

    /// True when `key` is an object directly under this execution's prefix.
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix())
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-execution-{}", self.start_time, self.execution_id)
    }
}

pub fn log_file_name(action: &str) -> String {
    format!("{}.log", action)
}

pub fn archive_file_name(repo: &str, branch: &str) -> String {
    format!("{}-{}.tar.gz", repo, flatten_branch(branch))
}

pub fn summary_file_name(repo: &str, branch: &str) -> String {
    format!("{}-{}-summary.txt", repo, flatten_branch(branch))
}

/// Branch with `/` flattened to `-`. Branches such as `feature/x` must not
/// open a sub-folder under the prefix or leak into resource names.
pub fn flatten_branch(branch: &str) -> String {
    branch.replace('/', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_layout() {
        let key = ExecutionKey::new("2024-05-01T10:00:00Z", "abc-123").unwrap();
        assert_eq!(
            key.prefix(),
            "scan_results/2024-05-01T10:00:00Z-execution-abc-123/"
        );
        assert_eq!(
            key.log_key("Bandit"),
            "scan_results/2024-05-01T10:00:00Z-execution-abc-123/Bandit.log"
        );
        assert_eq!(
            key.archive_key("scsp-repo-123456789012", "main"),
            "scan_results/2024-05-01T10:00:00Z-execution-abc-123/scsp-repo-123456789012-main.tar.gz"
        );
        assert!(key
            .summary_key("repo", "main")
            .ends_with("/repo-main-summary.txt"));
    }

    #[test]
    fn test_rejects_empty_or_nested_components() {
        assert!(ExecutionKey::new("", "id").is_none());
        assert!(ExecutionKey::new("t", " ").is_none());
        assert!(ExecutionKey::new("t", "a/b").is_none());
    }

    #[test]
    fn test_owns_only_direct_children() {
        let key = ExecutionKey::new("t0", "e1").unwrap();
        assert!(key.owns("scan_results/t0-execution-e1/Trivy.log"));
        assert!(!key.owns("scan_results/t0-execution-e1/nested/Trivy.log"));
        assert!(!key.owns("scan_results/t0-execution-e2/Trivy.log"));
        assert!(!key.owns("scan_results/t0-execution-e1/"));
    }

    #[test]
    fn test_branch_with_slash_stays_flat() {
        assert_eq!(
            archive_file_name("repo", "feature/login"),
            "repo-feature-login.tar.gz"
        );
    }

    #[test]
    fn test_shell_prefix_matches_layout() {
        let key = ExecutionKey::new("${START_TIME}", "$PIPELINE_RUN_ID").unwrap();
        assert_eq!(key.prefix(), format!("{}/", SHELL_PREFIX));
    }
}
