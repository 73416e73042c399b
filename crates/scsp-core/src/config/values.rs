use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Look `value` up in a fixed allowed-value table.
///
/// Matching is exact (deploy parameters are case-sensitive). On a miss the
/// error carries the full allowed set and, when one is close enough, a
/// suggestion.
pub(crate) fn parse_allowed<T: Copy>(
    field: &'static str,
    value: &str,
    table: &[(&'static str, T)],
) -> Result<T, ConfigurationError> {
    if let Some((_, v)) = table.iter().find(|(name, _)| *name == value) {
        return Ok(*v);
    }
    let names: Vec<&str> = table.iter().map(|(name, _)| *name).collect();
    Err(ConfigurationError::DisallowedValue {
        field,
        value: value.to_string(),
        allowed: names.join(", "),
        hint: suggestion_hint(value, &names),
    })
}

/// `"; did you mean 'X'?"` for the closest candidate within edit distance 2
/// (case-insensitive), or an empty string.
pub(crate) fn suggestion_hint(value: &str, candidates: &[&str]) -> String {
    let lowered = value.to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for &candidate in candidates {
        let dist = strsim::damerau_levenshtein(&lowered, &candidate.to_lowercase());
        if dist <= 2 && best.map_or(true, |(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }
    match best {
        Some((candidate, _)) => format!("; did you mean '{}'?", candidate),
        None => String::new(),
    }
}

/// Finding severity threshold shared by Checkov and Tfsec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const VALUES: &'static [(&'static str, Severity)] = &[
        ("LOW", Severity::Low),
        ("MEDIUM", Severity::Medium),
        ("HIGH", Severity::High),
        ("CRITICAL", Severity::Critical),
    ];

    pub fn parse(field: &'static str, value: &str) -> Result<Self, ConfigurationError> {
        parse_allowed(field, value, Self::VALUES)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semgrep rule severities used to filter reported findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SemgrepSeverity {
    Info,
    Warning,
    Error,
}

impl SemgrepSeverity {
    pub const VALUES: &'static [(&'static str, SemgrepSeverity)] = &[
        ("INFO", SemgrepSeverity::Info),
        ("WARNING", SemgrepSeverity::Warning),
        ("ERROR", SemgrepSeverity::Error),
    ];

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        parse_allowed("semgrep_severity", value, Self::VALUES)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SemgrepSeverity::Info => "INFO",
            SemgrepSeverity::Warning => "WARNING",
            SemgrepSeverity::Error => "ERROR",
        }
    }
}

/// SQL dialects understood by SQLFluff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Ansi,
    Athena,
    Bigquery,
    Clickhouse,
    Databricks,
    Db2,
    Exasol,
    Hive,
    Mysql,
    Oracle,
    Postgres,
    Redshift,
    Snowflake,
    Soql,
    Sparksql,
    Sqlite,
    Teradata,
    Tsql,
}

impl SqlDialect {
    pub const VALUES: &'static [(&'static str, SqlDialect)] = &[
        ("ansi", SqlDialect::Ansi),
        ("athena", SqlDialect::Athena),
        ("bigquery", SqlDialect::Bigquery),
        ("clickhouse", SqlDialect::Clickhouse),
        ("databricks", SqlDialect::Databricks),
        ("db2", SqlDialect::Db2),
        ("exasol", SqlDialect::Exasol),
        ("hive", SqlDialect::Hive),
        ("mysql", SqlDialect::Mysql),
        ("oracle", SqlDialect::Oracle),
        ("postgres", SqlDialect::Postgres),
        ("redshift", SqlDialect::Redshift),
        ("snowflake", SqlDialect::Snowflake),
        ("soql", SqlDialect::Soql),
        ("sparksql", SqlDialect::Sparksql),
        ("sqlite", SqlDialect::Sqlite),
        ("teradata", SqlDialect::Teradata),
        ("tsql", SqlDialect::Tsql),
    ];

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        parse_allowed("sql_dialect", value, Self::VALUES)
    }

    pub fn as_str(&self) -> &'static str {
        Self::VALUES
            .iter()
            .find(|(_, d)| d == self)
            .map(|(name, _)| *name)
            .unwrap_or("ansi")
    }
}

/// What happens to retained data (repository, log groups) on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RetentionMode {
    Retain,
    #[default]
    Delete,
}

impl RetentionMode {
    pub const VALUES: &'static [(&'static str, RetentionMode)] = &[
        ("Retain", RetentionMode::Retain),
        ("Delete", RetentionMode::Delete),
    ];

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        parse_allowed("retention_policy", value, Self::VALUES)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionMode::Retain => "Retain",
            RetentionMode::Delete => "Delete",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket holding the starter bundles.
pub const STARTER_BUCKET: &str = "proservetools";

/// Initial content for a freshly provisioned repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StarterBundle {
    #[default]
    Blank,
    Good,
    Bad,
}

impl StarterBundle {
    pub const VALUES: &'static [(&'static str, StarterBundle)] = &[
        ("blank", StarterBundle::Blank),
        ("good", StarterBundle::Good),
        ("bad", StarterBundle::Bad),
    ];

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        parse_allowed("starter_bundle", value, Self::VALUES)
    }

    /// Object key of the bundle inside [`STARTER_BUCKET`].
    pub fn object_key(&self) -> &'static str {
        match self {
            StarterBundle::Blank => "res/initial_scsp_repo.zip",
            StarterBundle::Good => "res/initial_scsp_repo_good.zip",
            StarterBundle::Bad => "res/initial_scsp_repo_bad.zip",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StarterBundle::Blank => "blank",
            StarterBundle::Good => "good",
            StarterBundle::Bad => "bad",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_values() {
        assert_eq!(Severity::parse("checkov", "HIGH").unwrap(), Severity::High);
        assert_eq!(SqlDialect::parse("postgres").unwrap(), SqlDialect::Postgres);
        assert_eq!(RetentionMode::parse("Retain").unwrap(), RetentionMode::Retain);
        assert_eq!(StarterBundle::parse("good").unwrap(), StarterBundle::Good);
    }

    #[test]
    fn test_rejects_value_outside_allowed_set() {
        let err = SqlDialect::parse("mssql").unwrap_err();
        match err {
            ConfigurationError::DisallowedValue { field, allowed, .. } => {
                assert_eq!(field, "sql_dialect");
                assert!(allowed.contains("tsql"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_case_mismatch_is_rejected_with_suggestion() {
        let err = Severity::parse("tfsec_severity", "high").unwrap_err();
        assert!(err.to_string().contains("did you mean 'HIGH'"));
    }

    #[test]
    fn test_no_suggestion_for_distant_values() {
        let err = RetentionMode::parse("Snapshot").unwrap_err();
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_every_dialect_round_trips_its_name() {
        for (name, dialect) in SqlDialect::VALUES {
            assert_eq!(dialect.as_str(), *name);
        }
    }
}
