//! Fan-in step: wait for scan logs, bundle them, publish a summary.
//!
//! Scan actions never talk to each other. Each uploads `<name>.log` under
//! the execution prefix; this step polls that prefix with a bounded budget,
//! proceeds with whatever arrived, and never fails because a log is
//! missing or the execution history is unreadable. Upload failures do
//! propagate.

pub mod archive;
pub mod step;
pub mod summary;

pub use archive::{build_archive, read_archive};
pub use step::{
    AggregationStep, AGGREGATION_QUEUED_TIMEOUT_MINUTES, AGGREGATION_TIMEOUT_MINUTES,
    SUMMARY_POLICY_NAME, SUMMARY_ROLE_NAME,
};
pub use summary::{render_summary, summary_records};

use crate::actions::ScanActionDescriptor;
use crate::config::PipelineConfiguration;
use crate::error::StorageResult;
use crate::execution::ExecutionKey;
use crate::outcome::Outcome;
use crate::pipeline::aggregation_action_name;
use crate::storage::{ActionStatus, ArtifactStore, ExecutionHistory};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SHORTFALL_MESSAGE: &str =
    "ERROR - Not all tools successfully uploaded scan results. Proceeding with scans that did complete.";

pub const HISTORY_UNAVAILABLE_MESSAGE: &str =
    "ERROR - Unable to list action executions. Action statuses are missing from this summary.";

/// Bounded wait for scan logs: one initial delay, then up to
/// `max_attempts` checks, each preceded by `retry_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            max_attempts: 8,
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Same attempt budget, no sleeping.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Longest the step can wait before proceeding.
    pub fn worst_case_wait(&self) -> Duration {
        self.initial_delay + self.retry_delay * self.max_attempts
    }
}

/// Non-fatal conditions recorded on an [`AggregationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationWarning {
    MissingLogs {
        expected: usize,
        found: usize,
        missing: Vec<String>,
    },
    /// The execution history could not be read; the summary carries no
    /// per-action statuses.
    HistoryUnavailable { reason: String },
}

impl fmt::Display for AggregationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationWarning::MissingLogs {
                expected,
                found,
                missing,
            } => {
                write!(f, "{} ({} of {} logs", SHORTFALL_MESSAGE, found, expected)?;
                if !missing.is_empty() {
                    write!(f, "; missing: {}", missing.join(", "))?;
                }
                write!(f, ")")
            }
            AggregationWarning::HistoryUnavailable { reason } => {
                write!(f, "{} ({})", HISTORY_UNAVAILABLE_MESSAGE, reason)
            }
        }
    }
}

/// Everything the step needs to know about one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRequest {
    pub pipeline: String,
    pub aggregation_action: String,
    pub repository: String,
    pub branch: String,
    pub execution: ExecutionKey,
    /// Scan actions expected to upload a log, in catalogue order.
    pub expected_actions: Vec<String>,
}

impl AggregationRequest {
    pub fn new(
        config: &PipelineConfiguration,
        execution: ExecutionKey,
        scans: &[ScanActionDescriptor],
    ) -> Self {
        let pipeline = config.pipeline_name();
        Self {
            aggregation_action: aggregation_action_name(&pipeline),
            pipeline,
            repository: config.repository_name(),
            branch: config.branch.clone(),
            execution,
            expected_actions: scans.iter().map(|s| s.name.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    /// Status from the execution history; `None` when the history has no
    /// record of the action.
    pub status: Option<ActionStatus>,
    /// Storage key of the uploaded log, if it arrived in time.
    pub log_location: Option<String>,
}

impl ActionReport {
    pub fn outcome(&self) -> Outcome {
        match &self.status {
            Some(ActionStatus::Failed) => Outcome::Flagged { code: 1 },
            _ => Outcome::Clean,
        }
    }
}

/// Published result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub execution: ExecutionKey,
    pub actions: BTreeMap<String, ActionReport>,
    pub warnings: Vec<AggregationWarning>,
    pub archive_key: String,
    pub summary_key: String,
    /// Number of storage checks performed.
    pub attempts: u32,
    pub summary: String,
}

impl AggregationResult {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Failed if any recorded action failed.
    pub fn overall(&self) -> Outcome {
        self.actions.values().map(ActionReport::outcome).collect()
    }
}

/// Log keys directly under the execution prefix.
async fn discover_logs<S>(store: &S, execution: &ExecutionKey) -> StorageResult<Vec<String>>
where
    S: ArtifactStore + ?Sized,
{
    Ok(store
        .list(&execution.prefix())
        .await?
        .into_iter()
        .filter(|key| execution.owns(key) && key.ends_with(".log"))
        .collect())
}

/// Expected actions whose log is not among `logs`, in catalogue order.
fn missing_actions(request: &AggregationRequest, logs: &[String]) -> Vec<String> {
    request
        .expected_actions
        .iter()
        .filter(|name| {
            let key = request.execution.log_key(name);
            !logs.iter().any(|log| *log == key)
        })
        .cloned()
        .collect()
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Run the aggregation step for one execution.
pub async fn aggregate<S, H>(
    store: &S,
    history: &H,
    request: &AggregationRequest,
    policy: &PollPolicy,
) -> StorageResult<AggregationResult>
where
    S: ArtifactStore + ?Sized,
    H: ExecutionHistory + ?Sized,
{
    let execution = &request.execution;
    let expected = request.expected_actions.len();

    pause(policy.initial_delay).await;
    let mut attempts = 0;
    let mut logs = Vec::new();
    let mut missing = request.expected_actions.clone();
    for attempt in 1..=policy.max_attempts.max(1) {
        pause(policy.retry_delay).await;
        attempts = attempt;
        logs = discover_logs(store, execution).await?;
        missing = missing_actions(request, &logs);
        debug!(
            execution = %execution,
            attempt,
            found = logs.len(),
            missing = missing.len(),
            "checked for scan logs"
        );
        if missing.is_empty() {
            break;
        }
    }

    let found: BTreeSet<&str> = logs.iter().map(String::as_str).collect();
    let mut warnings = Vec::new();
    if !missing.is_empty() {
        let arrived = expected - missing.len();
        warn!(
            execution = %execution,
            found = arrived,
            expected,
            missing = ?missing,
            "{}",
            SHORTFALL_MESSAGE
        );
        warnings.push(AggregationWarning::MissingLogs {
            expected,
            found: arrived,
            missing,
        });
    }

    let mut contents = Vec::with_capacity(logs.len());
    for key in &logs {
        contents.push((key.as_str(), store.get(key).await?));
    }
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;
    let bundle = build_archive(
        contents.iter().map(|(key, data)| (*key, data.as_slice())),
        mtime,
    )?;
    let archive_key = execution.archive_key(&request.repository, &request.branch);
    store.put(&archive_key, bundle).await?;

    let records = match history
        .action_executions(&request.pipeline, &execution.execution_id)
        .await
    {
        Ok(records) => records,
        Err(err) => {
            warn!(
                execution = %execution,
                pipeline = %request.pipeline,
                error = %err,
                "{}",
                HISTORY_UNAVAILABLE_MESSAGE
            );
            warnings.push(AggregationWarning::HistoryUnavailable {
                reason: err.to_string(),
            });
            Vec::new()
        }
    };
    let reported: Vec<_> = summary_records(&records, &request.aggregation_action).collect();
    let summary = render_summary(reported.iter().copied(), &warnings);
    let summary_key = execution.summary_key(&request.repository, &request.branch);
    store.put(&summary_key, summary.clone().into_bytes()).await?;

    let mut actions: BTreeMap<String, ActionReport> = request
        .expected_actions
        .iter()
        .map(|name| {
            let key = execution.log_key(name);
            let report = ActionReport {
                status: None,
                log_location: found.contains(key.as_str()).then_some(key),
            };
            (name.clone(), report)
        })
        .collect();
    for record in reported {
        let log_key = execution.log_key(&record.action_name);
        actions
            .entry(record.action_name.clone())
            .or_insert_with(|| ActionReport {
                status: None,
                log_location: found.contains(log_key.as_str()).then_some(log_key),
            })
            .status = Some(record.status.clone());
    }

    info!(
        execution = %execution,
        logs = logs.len(),
        attempts,
        archive = %archive_key,
        summary = %summary_key,
        "published aggregation results"
    );

    Ok(AggregationResult {
        execution: execution.clone(),
        actions,
        warnings,
        archive_key,
        summary_key,
        attempts,
        summary,
    })
}
