use thiserror::Error;

/// Invalid or contradictory deploy-time input. Always fatal: nothing is
/// constructed once one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Cannot specify both a new and existing repository (ExistingRepoARN='{existing}', NewRepoName='{new}')")]
    BothRepositories { existing: String, new: String },

    #[error("No repository selected: provide either an existing repository ARN or a new repository name")]
    NoRepository,

    #[error("'{value}' is not an allowed value for {field} (allowed: {allowed}){hint}")]
    DisallowedValue {
        field: &'static str,
        value: String,
        allowed: String,
        hint: String,
    },

    #[error("Semgrep config parameter error: cannot use auto with other Semgrep config rules (got: {entries})")]
    SemgrepAutoMixed { entries: String },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("Invalid {field} '{value}': {reason}")]
    Malformed {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("account_id is required when creating a new repository (the repository name is suffixed with it)")]
    MissingAccountId,

    #[error("Unknown parameter '{name}'{hint}")]
    UnknownParameter { name: String, hint: String },

    #[error("Failed to load parameters from '{path}': {message}")]
    Unreadable { path: String, message: String },
}

/// Failures talking to the shared artifact store or the execution history.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object '{key}' not found")]
    NotFound { key: String },

    #[error("Invalid storage key '{key}'")]
    InvalidKey { key: String },

    #[error("Failed to build results archive: {0}")]
    Archive(String),

    #[error("Failed to read execution history: {0}")]
    History(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures while rendering declarative output.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to serialize template as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize template as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Parameter '{parameter}' does not accept '{value}'. Allowed: {allowed}")]
    DisallowedParameter {
        parameter: String,
        value: String,
        allowed: String,
    },

    #[error("Rule '{rule}' failed: {description}")]
    RuleViolation { rule: String, description: String },
}

/// Structural problems in an assembled pipeline topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Pipeline '{pipeline}' has no '{stage}' stage")]
    MissingStage { pipeline: String, stage: String },

    #[error("Action '{action}' does not consume the shared source artifact '{artifact}'")]
    DetachedAction { action: String, artifact: String },

    #[error("Action '{action}' is sequenced with runOrder {run_order}; validate actions must all share runOrder 1")]
    Sequenced { action: String, run_order: u32 },

    #[error("Expected exactly one aggregation action in stage '{stage}', found {found}")]
    Aggregation { stage: String, found: usize },

    #[error("Duplicate action name '{action}'")]
    DuplicateAction { action: String },

    #[error("Action '{action}' does not receive the execution correlation variable {variable}")]
    Uncorrelated { action: String, variable: String },
}

/// Failures while planning or declaring the resource set.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}
