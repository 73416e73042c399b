pub mod params;
pub mod values;

pub use params::{generate_default_parameters, load_parameters, parse_override, RawParameters};
pub use values::{
    RetentionMode, SemgrepSeverity, Severity, SqlDialect, StarterBundle, STARTER_BUCKET,
};

use crate::error::ConfigurationError;
use crate::execution::flatten_branch;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Sentinel that lets Semgrep pick registry rules for the project.
pub const SEMGREP_AUTO: &str = "auto";

/// Parameter names as they appear in the declarative template and in
/// condition expressions.
pub const PARAM_BRANCH: &str = "mainBranchName";
pub const PARAM_EXISTING_REPO: &str = "ExistingRepoARN";
pub const PARAM_NEW_REPO: &str = "NewRepoName";
pub const PARAM_RETENTION: &str = "RetentionPolicy";

/// ARN of an existing CodeCommit repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryArn(String);

impl RepositoryArn {
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        static ARN_RE: OnceLock<Regex> = OnceLock::new();
        let re = ARN_RE.get_or_init(|| {
            Regex::new(r"^arn:aws[a-z-]*:codecommit:[a-z0-9-]+:\d{12}:[A-Za-z0-9._-]{1,100}$")
                .expect("static regex")
        });
        if re.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ConfigurationError::Malformed {
                field: "existing_repo_arn",
                value: value.to_string(),
                reason: "expected arn:<partition>:codecommit:<region>:<account>:<repository>"
                    .to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repository name: the last `:`-separated segment.
    pub fn repository_name(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }
}

/// Which repository the pipeline reads from. Exactly one variant exists by
/// construction, so "both" and "neither" are unrepresentable past
/// [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositorySelection {
    New { name: String, account_id: String },
    Existing { arn: RepositoryArn },
}

impl RepositorySelection {
    pub fn new_repo_name(&self) -> Option<&str> {
        match self {
            RepositorySelection::New { name, .. } => Some(name),
            RepositorySelection::Existing { .. } => None,
        }
    }

    pub fn existing_arn(&self) -> Option<&RepositoryArn> {
        match self {
            RepositorySelection::New { .. } => None,
            RepositorySelection::Existing { arn } => Some(arn),
        }
    }

    pub fn creates_repository(&self) -> bool {
        matches!(self, RepositorySelection::New { .. })
    }

    /// Name of the repository the pipeline reads from. New repositories are
    /// suffixed with the account id so the name is unique per account.
    pub fn repository_name(&self) -> String {
        match self {
            RepositorySelection::New { name, account_id } => format!("{}-{}", name, account_id),
            RepositorySelection::Existing { arn } => arn.repository_name().to_string(),
        }
    }
}

/// Semgrep rule source: the registry's automatic selection, or explicit configs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemgrepConfig {
    Auto,
    Rules(Vec<String>),
}

impl SemgrepConfig {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            SemgrepConfig::Auto => vec![SEMGREP_AUTO],
            SemgrepConfig::Rules(rules) => rules.iter().map(String::as_str).collect(),
        }
    }
}

/// Per-tool settings, already validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub checkov_severity: Severity,
    pub tfsec_severity: Severity,
    pub cfn_templates_paths: Vec<String>,
    pub terraform_paths: Vec<String>,
    pub config_rules_paths: Vec<String>,
    pub sql_dialect: SqlDialect,
    pub tfsec_exclude: Vec<String>,
    pub semgrep_config: SemgrepConfig,
    pub semgrep_severities: Vec<SemgrepSeverity>,
    pub jshint_exclude: Vec<String>,
    pub jshint_options: Vec<String>,
}

impl ToolSettings {
    /// Value following the first `--config`: `a --config b --config c`.
    pub fn semgrep_config_arg(&self) -> String {
        self.semgrep_config.entries().join(" --config ")
    }

    /// Value following the first `--severity`: `ERROR --severity WARNING`.
    pub fn semgrep_severity_arg(&self) -> String {
        self.semgrep_severities
            .iter()
            .map(SemgrepSeverity::as_str)
            .collect::<Vec<_>>()
            .join(" --severity ")
    }

    /// ` -e rule1,rule2`, or nothing at all when no rule is excluded.
    pub fn tfsec_exclude_flag(&self) -> String {
        if self.tfsec_exclude.is_empty() {
            String::new()
        } else {
            format!(" -e {}", self.tfsec_exclude.join(","))
        }
    }

    /// ` --exclude dir1,dir2`, or nothing at all.
    pub fn jshint_exclude_flag(&self) -> String {
        if self.jshint_exclude.is_empty() {
            String::new()
        } else {
            format!(" --exclude {}", self.jshint_exclude.join(","))
        }
    }

    /// ` --config ./config.json` when options were given.
    pub fn jshint_config_flag(&self) -> String {
        if self.jshint_options.is_empty() {
            String::new()
        } else {
            " --config ./config.json".to_string()
        }
    }

    /// Contents of the JSHint `config.json`, enabling every listed option.
    pub fn jshint_config_json(&self) -> Option<String> {
        if self.jshint_options.is_empty() {
            return None;
        }
        let options: serde_json::Map<String, serde_json::Value> = self
            .jshint_options
            .iter()
            .map(|opt| (opt.clone(), serde_json::Value::Bool(true)))
            .collect();
        Some(serde_json::Value::Object(options).to_string())
    }
}

/// The validated, immutable configuration of one deployment.
///
/// Built once by [`resolve`] and shared by reference with every other
/// component; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfiguration {
    pub branch: String,
    pub repository: RepositorySelection,
    pub retention: RetentionMode,
    pub starter_bundle: StarterBundle,
    pub tools: ToolSettings,
}

impl PipelineConfiguration {
    /// `<new-repo>-<branch>` for a new repository,
    /// `scsp-<repository>-<branch>` for an existing one. The pipeline,
    /// project and action names derive from it, so `/` in the branch is
    /// flattened to `-`.
    pub fn pipeline_name(&self) -> String {
        let branch = flatten_branch(&self.branch);
        match &self.repository {
            RepositorySelection::New { name, .. } => format!("{}-{}", name, branch),
            RepositorySelection::Existing { arn } => {
                format!("scsp-{}-{}", arn.repository_name(), branch)
            }
        }
    }

    /// Name of the repository the pipeline reads from.
    pub fn repository_name(&self) -> String {
        self.repository.repository_name()
    }

    /// Parameter values as they would be supplied to the deployment, keyed by
    /// template parameter name. Used to evaluate condition expressions.
    pub fn parameter_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert(PARAM_BRANCH.to_string(), self.branch.clone());
        values.insert(
            PARAM_EXISTING_REPO.to_string(),
            self.repository
                .existing_arn()
                .map(|arn| arn.as_str().to_string())
                .unwrap_or_default(),
        );
        values.insert(
            PARAM_NEW_REPO.to_string(),
            self.repository.new_repo_name().unwrap_or_default().to_string(),
        );
        values.insert(
            PARAM_RETENTION.to_string(),
            self.retention.as_str().to_string(),
        );
        values
    }
}

/// Split a comma-delimited list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"))
}

fn branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._/-]+$").expect("static regex"))
}

// Values interpolated into build commands.
fn shell_safe_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._/:@+=~-]+$").expect("static regex"))
}

fn check_shell_safe(field: &'static str, entries: &[String]) -> Result<(), ConfigurationError> {
    for entry in entries {
        if !shell_safe_re().is_match(entry) {
            return Err(ConfigurationError::Malformed {
                field,
                value: entry.clone(),
                reason: "only letters, digits and . _ / : @ + = ~ - are allowed".to_string(),
            });
        }
    }
    Ok(())
}

fn path_list(field: &'static str, value: &str) -> Result<Vec<String>, ConfigurationError> {
    let paths = split_list(value);
    check_shell_safe(field, &paths)?;
    Ok(paths)
}

fn resolve_repository(raw: &RawParameters) -> Result<RepositorySelection, ConfigurationError> {
    let existing = raw.existing_repo_arn.trim();
    let new = raw.new_repo_name.trim();

    match (existing.is_empty(), new.is_empty()) {
        (false, false) => Err(ConfigurationError::BothRepositories {
            existing: existing.to_string(),
            new: new.to_string(),
        }),
        (true, true) => Err(ConfigurationError::NoRepository),
        (false, true) => Ok(RepositorySelection::Existing {
            arn: RepositoryArn::parse(existing)?,
        }),
        (true, false) => {
            if !name_re().is_match(new) {
                return Err(ConfigurationError::Malformed {
                    field: "new_repo_name",
                    value: new.to_string(),
                    reason: "only letters, digits, '.', '_' and '-' are allowed".to_string(),
                });
            }
            let account_id = raw.account_id.trim();
            if account_id.is_empty() {
                return Err(ConfigurationError::MissingAccountId);
            }
            if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigurationError::Malformed {
                    field: "account_id",
                    value: account_id.to_string(),
                    reason: "expected a 12-digit account id".to_string(),
                });
            }
            Ok(RepositorySelection::New {
                name: new.to_string(),
                account_id: account_id.to_string(),
            })
        }
    }
}

fn resolve_semgrep_config(value: &str) -> Result<SemgrepConfig, ConfigurationError> {
    let entries = split_list(value);
    if entries.is_empty() {
        return Err(ConfigurationError::Empty {
            field: "semgrep_config",
        });
    }
    if entries.iter().any(|e| e == SEMGREP_AUTO) {
        if entries.iter().all(|e| e == SEMGREP_AUTO) {
            return Ok(SemgrepConfig::Auto);
        }
        return Err(ConfigurationError::SemgrepAutoMixed {
            entries: entries.join(","),
        });
    }
    check_shell_safe("semgrep_config", &entries)?;
    Ok(SemgrepConfig::Rules(entries))
}

fn resolve_semgrep_severities(value: &str) -> Result<Vec<SemgrepSeverity>, ConfigurationError> {
    let entries = split_list(value);
    if entries.is_empty() {
        return Err(ConfigurationError::Empty {
            field: "semgrep_severity",
        });
    }
    entries.iter().map(|e| SemgrepSeverity::parse(e)).collect()
}

fn resolve_jshint_options(value: &str) -> Result<Vec<String>, ConfigurationError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));
    let options = split_list(value);
    for option in &options {
        if !re.is_match(option) {
            return Err(ConfigurationError::Malformed {
                field: "jshint_config_list",
                value: option.clone(),
                reason: "JSHint option names are identifiers".to_string(),
            });
        }
    }
    Ok(options)
}

/// Validate raw parameters and produce the deployment's configuration.
///
/// Pure: no I/O, no partial state. The first violated rule is returned.
pub fn resolve(raw: &RawParameters) -> Result<PipelineConfiguration, ConfigurationError> {
    let branch = raw.branch_name.trim();
    if branch.is_empty() {
        return Err(ConfigurationError::Empty {
            field: "branch_name",
        });
    }
    if !branch_re().is_match(branch) {
        return Err(ConfigurationError::Malformed {
            field: "branch_name",
            value: branch.to_string(),
            reason: "only letters, digits, '.', '_', '/' and '-' are allowed".to_string(),
        });
    }

    let repository = resolve_repository(raw)?;
    let retention = RetentionMode::parse(raw.retention_policy.trim())?;
    let starter_bundle = StarterBundle::parse(raw.starter_bundle.trim())?;

    let mut cfn_templates_paths = path_list("cfn_templates_path", &raw.cfn_templates_path)?;
    if cfn_templates_paths.is_empty() {
        cfn_templates_paths.push(".".to_string());
    }
    let terraform_paths = path_list("terraform_code_path", &raw.terraform_code_path)?;
    let config_rules_paths = path_list("config_rules_path", &raw.config_rules_path)?;

    let tfsec_exclude = split_list(&raw.tfsec_exclude_list);
    check_shell_safe("tfsec_exclude_list", &tfsec_exclude)?;
    let jshint_exclude = split_list(&raw.jshint_exclude_list);
    check_shell_safe("jshint_exclude_list", &jshint_exclude)?;

    let tools = ToolSettings {
        checkov_severity: Severity::parse(
            "checkov_severity_trigger",
            raw.checkov_severity_trigger.trim(),
        )?,
        tfsec_severity: Severity::parse("tfsec_severity", raw.tfsec_severity.trim())?,
        cfn_templates_paths,
        terraform_paths,
        config_rules_paths,
        sql_dialect: SqlDialect::parse(raw.sql_dialect.trim())?,
        tfsec_exclude,
        semgrep_config: resolve_semgrep_config(&raw.semgrep_config)?,
        semgrep_severities: resolve_semgrep_severities(&raw.semgrep_severity)?,
        jshint_exclude,
        jshint_options: resolve_jshint_options(&raw.jshint_config_list)?,
    };

    let config = PipelineConfiguration {
        branch: branch.to_string(),
        repository,
        retention,
        starter_bundle,
        tools,
    };
    debug!(
        pipeline = %config.pipeline_name(),
        retention = %config.retention,
        "resolved pipeline configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:codecommit:us-east-1:123456789012:payments";

    fn new_repo() -> RawParameters {
        RawParameters {
            account_id: "123456789012".to_string(),
            ..Default::default()
        }
    }

    fn existing_repo() -> RawParameters {
        RawParameters {
            existing_repo_arn: ARN.to_string(),
            new_repo_name: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_resolve_to_new_repository() {
        let config = resolve(&new_repo()).unwrap();
        assert_eq!(config.branch, "main");
        assert_eq!(config.retention, RetentionMode::Delete);
        assert_eq!(config.repository_name(), "scsp-repo-123456789012");
        assert_eq!(config.pipeline_name(), "scsp-repo-main");
        assert_eq!(config.tools.semgrep_config, SemgrepConfig::Auto);
        assert_eq!(
            config.tools.semgrep_severities,
            vec![SemgrepSeverity::Error, SemgrepSeverity::Warning]
        );
    }

    #[test]
    fn test_branch_slashes_stay_out_of_resource_names() {
        let config = resolve(&RawParameters {
            branch_name: "feature/x".to_string(),
            ..new_repo()
        })
        .unwrap();
        assert_eq!(config.branch, "feature/x");
        assert_eq!(config.pipeline_name(), "scsp-repo-feature-x");

        let existing = resolve(&RawParameters {
            branch_name: "release/2024/q1".to_string(),
            ..existing_repo()
        })
        .unwrap();
        assert_eq!(existing.pipeline_name(), "scsp-payments-release-2024-q1");
    }

    #[test]
    fn test_existing_repository_names() {
        let config = resolve(&existing_repo()).unwrap();
        assert_eq!(config.repository_name(), "payments");
        assert_eq!(config.pipeline_name(), "scsp-payments-main");
        assert!(!config.repository.creates_repository());
    }

    #[test]
    fn test_repository_selection_is_xor() {
        let both = RawParameters {
            existing_repo_arn: ARN.to_string(),
            ..new_repo()
        };
        assert!(matches!(
            resolve(&both),
            Err(ConfigurationError::BothRepositories { .. })
        ));

        let neither = RawParameters {
            new_repo_name: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve(&neither), Err(ConfigurationError::NoRepository));
    }

    #[test]
    fn test_exactly_one_repository_reference_is_set() {
        for raw in [new_repo(), existing_repo()] {
            let config = resolve(&raw).unwrap();
            let refs = [
                config.repository.new_repo_name().is_some(),
                config.repository.existing_arn().is_some(),
            ];
            assert_eq!(refs.iter().filter(|set| **set).count(), 1);
            assert!(!config.repository_name().is_empty());
        }
    }

    #[test]
    fn test_new_repository_requires_account_id() {
        assert_eq!(
            resolve(&RawParameters::default()),
            Err(ConfigurationError::MissingAccountId)
        );
        let bad = RawParameters {
            account_id: "12345".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&bad),
            Err(ConfigurationError::Malformed { field: "account_id", .. })
        ));
    }

    #[test]
    fn test_malformed_arn_is_rejected() {
        let raw = RawParameters {
            existing_repo_arn: "arn:aws:s3:::bucket".to_string(),
            new_repo_name: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&raw),
            Err(ConfigurationError::Malformed { field: "existing_repo_arn", .. })
        ));
    }

    #[test]
    fn test_semgrep_auto_must_stand_alone() {
        for value in ["auto,p/python", "p/python,auto", "auto, auto ,p/ci"] {
            let raw = RawParameters {
                semgrep_config: value.to_string(),
                ..new_repo()
            };
            assert!(
                matches!(resolve(&raw), Err(ConfigurationError::SemgrepAutoMixed { .. })),
                "{value} should be rejected"
            );
        }

        let only_auto = RawParameters {
            semgrep_config: "auto,auto".to_string(),
            ..new_repo()
        };
        assert_eq!(
            resolve(&only_auto).unwrap().tools.semgrep_config,
            SemgrepConfig::Auto
        );
    }

    #[test]
    fn test_semgrep_rules_are_joined() {
        let raw = RawParameters {
            semgrep_config: "p/python, p/secrets".to_string(),
            semgrep_severity: "ERROR".to_string(),
            ..new_repo()
        };
        let config = resolve(&raw).unwrap();
        assert_eq!(
            config.tools.semgrep_config_arg(),
            "p/python --config p/secrets"
        );
        assert_eq!(config.tools.semgrep_severity_arg(), "ERROR");
    }

    #[test]
    fn test_semgrep_severity_members_are_checked() {
        let raw = RawParameters {
            semgrep_severity: "ERROR,CRITICAL".to_string(),
            ..new_repo()
        };
        assert!(matches!(
            resolve(&raw),
            Err(ConfigurationError::DisallowedValue { field: "semgrep_severity", .. })
        ));
    }

    #[test]
    fn test_enumerated_fields_are_checked() {
        let cases: Vec<(&str, RawParameters)> = vec![
            (
                "checkov_severity_trigger",
                RawParameters {
                    checkov_severity_trigger: "SEVERE".into(),
                    ..new_repo()
                },
            ),
            (
                "tfsec_severity",
                RawParameters {
                    tfsec_severity: "INFO".into(),
                    ..new_repo()
                },
            ),
            (
                "sql_dialect",
                RawParameters {
                    sql_dialect: "mariadb".into(),
                    ..new_repo()
                },
            ),
            (
                "retention_policy",
                RawParameters {
                    retention_policy: "Snapshot".into(),
                    ..new_repo()
                },
            ),
        ];
        for (expected_field, raw) in cases {
            match resolve(&raw) {
                Err(ConfigurationError::DisallowedValue { field, .. }) => {
                    assert_eq!(field, expected_field)
                }
                other => panic!("{expected_field}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_tfsec_exclude_omits_flag() {
        let config = resolve(&new_repo()).unwrap();
        assert_eq!(config.tools.tfsec_exclude_flag(), "");

        let raw = RawParameters {
            tfsec_exclude_list: "aws-s3-enable-bucket-logging, aws-s3-enable-versioning".into(),
            ..new_repo()
        };
        let config = resolve(&raw).unwrap();
        assert_eq!(
            config.tools.tfsec_exclude_flag(),
            " -e aws-s3-enable-bucket-logging,aws-s3-enable-versioning"
        );
    }

    #[test]
    fn test_jshint_flags() {
        let config = resolve(&new_repo()).unwrap();
        assert_eq!(config.tools.jshint_exclude_flag(), "");
        assert_eq!(config.tools.jshint_config_flag(), "");
        assert!(config.tools.jshint_config_json().is_none());

        let raw = RawParameters {
            jshint_exclude_list: "vendor".into(),
            jshint_config_list: "esversion,undef".into(),
            ..new_repo()
        };
        let config = resolve(&raw).unwrap();
        assert_eq!(config.tools.jshint_exclude_flag(), " --exclude vendor");
        assert_eq!(config.tools.jshint_config_flag(), " --config ./config.json");
        assert_eq!(
            config.tools.jshint_config_json().unwrap(),
            r#"{"esversion":true,"undef":true}"#
        );
    }

    #[test]
    fn test_shell_metacharacters_are_rejected() {
        let raw = RawParameters {
            terraform_code_path: "infra; rm -rf /".into(),
            ..new_repo()
        };
        assert!(matches!(
            resolve(&raw),
            Err(ConfigurationError::Malformed { field: "terraform_code_path", .. })
        ));
    }

    #[test]
    fn test_empty_cfn_path_falls_back_to_root() {
        let raw = RawParameters {
            cfn_templates_path: String::new(),
            ..new_repo()
        };
        assert_eq!(resolve(&raw).unwrap().tools.cfn_templates_paths, vec!["."]);
    }

    #[test]
    fn test_parameter_values_reflect_selection() {
        let values = resolve(&existing_repo()).unwrap().parameter_values();
        assert_eq!(values[PARAM_EXISTING_REPO], ARN);
        assert_eq!(values[PARAM_NEW_REPO], "");
        assert_eq!(values[PARAM_RETENTION], "Delete");
    }
}
