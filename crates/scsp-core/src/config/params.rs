use crate::config::values::suggestion_hint;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw deploy-time parameters exactly as a user supplies them: plain strings
/// and comma-delimited lists. Loaded from `scsp.toml` and overlaid with
/// `--set key=value` overrides, then turned into a
/// [`PipelineConfiguration`](super::PipelineConfiguration) by
/// [`resolve`](super::resolve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawParameters {
    /// Branch scanned by the pipeline.
    pub branch_name: String,
    /// ARN of an existing CodeCommit repository. Mutually exclusive with `new_repo_name`.
    pub existing_repo_arn: String,
    /// Name of a repository to create. Mutually exclusive with `existing_repo_arn`.
    pub new_repo_name: String,
    /// Account id appended to a new repository's name.
    pub account_id: String,
    /// `Retain` or `Delete`.
    pub retention_policy: String,
    /// `blank`, `good` or `bad`.
    pub starter_bundle: String,
    pub checkov_severity_trigger: String,
    pub cfn_templates_path: String,
    pub terraform_code_path: String,
    pub config_rules_path: String,
    pub sql_dialect: String,
    pub tfsec_exclude_list: String,
    pub tfsec_severity: String,
    pub semgrep_config: String,
    pub semgrep_severity: String,
    pub jshint_exclude_list: String,
    pub jshint_config_list: String,
}

impl Default for RawParameters {
    fn default() -> Self {
        Self {
            branch_name: "main".to_string(),
            existing_repo_arn: String::new(),
            new_repo_name: "scsp-repo".to_string(),
            account_id: String::new(),
            retention_policy: "Delete".to_string(),
            starter_bundle: "blank".to_string(),
            checkov_severity_trigger: "HIGH".to_string(),
            cfn_templates_path: "cfn_templates".to_string(),
            terraform_code_path: "terraform_files".to_string(),
            config_rules_path: "config_rules".to_string(),
            sql_dialect: "mysql".to_string(),
            tfsec_exclude_list: String::new(),
            tfsec_severity: "HIGH".to_string(),
            semgrep_config: "auto".to_string(),
            semgrep_severity: "ERROR,WARNING".to_string(),
            jshint_exclude_list: String::new(),
            jshint_config_list: String::new(),
        }
    }
}

impl RawParameters {
    /// Parse parameters from TOML content. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content).map_err(|e| ConfigurationError::Unreadable {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Names of every accepted parameter key.
    pub fn keys() -> Vec<String> {
        match toml::Value::try_from(RawParameters::default()) {
            Ok(toml::Value::Table(table)) => table.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Apply `key=value` overrides on top of these parameters.
    ///
    /// Keys are the same snake_case names used in `scsp.toml`. Unknown keys
    /// are rejected with a suggestion when one is close.
    pub fn with_overrides<'a, I>(self, overrides: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut table = match toml::Value::try_from(&self) {
            Ok(toml::Value::Table(table)) => table,
            _ => return Ok(self),
        };

        for (key, value) in overrides {
            let key = key.trim();
            if !table.contains_key(key) {
                let known: Vec<&str> = table.keys().map(String::as_str).collect();
                return Err(ConfigurationError::UnknownParameter {
                    name: key.to_string(),
                    hint: suggestion_hint(key, &known),
                });
            }
            table.insert(key.to_string(), toml::Value::String(value.to_string()));
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigurationError::Unreadable {
                path: "<overrides>".to_string(),
                message: e.to_string(),
            })
    }
}

/// Split a `key=value` override argument.
pub fn parse_override(arg: &str) -> Result<(&str, &str), ConfigurationError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(ConfigurationError::Malformed {
            field: "override",
            value: arg.to_string(),
            reason: "expected KEY=VALUE".to_string(),
        }),
    }
}

/// Load parameters from a TOML file.
pub fn load_parameters(path: &Path) -> Result<RawParameters, ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| ConfigurationError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Generate a starter parameters file.
pub fn generate_default_parameters() -> String {
    r#"# Simple Code Scanning Pipeline parameters
# Every key is optional; the values below are the defaults.

# Branch scanned by the pipeline. New repositories always use 'main'.
branch_name = "main"

# Set exactly ONE of existing_repo_arn / new_repo_name.
# existing_repo_arn = "arn:aws:codecommit:us-east-1:123456789012:my-repo"
new_repo_name = "scsp-repo"

# Required when creating a new repository; appended to its name.
# account_id = "123456789012"

# Retain | Delete: what happens to the repository and log groups on teardown.
retention_policy = "Delete"

# Initial repository contents: blank | good | bad
starter_bundle = "blank"

# Checkov: minimum severity that fails the action (LOW, MEDIUM, HIGH, CRITICAL)
checkov_severity_trigger = "HIGH"

# Comma-separated paths, relative to the repository root
cfn_templates_path = "cfn_templates"
terraform_code_path = "terraform_files"
config_rules_path = "config_rules"

# SQLFluff dialect
sql_dialect = "mysql"

# Tfsec: minimum severity reported, and comma-separated rule long ids to skip
tfsec_severity = "HIGH"
tfsec_exclude_list = ""

# Semgrep: 'auto' or a comma-separated list of configs (auto cannot be mixed)
semgrep_config = "auto"
# Comma-separated subset of INFO, WARNING, ERROR
semgrep_severity = "ERROR,WARNING"

# JSHint: comma-separated directories to skip, and options to enable
jshint_exclude_list = ""
jshint_config_list = ""
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_generated_file() {
        let parsed = RawParameters::from_toml(&generate_default_parameters()).unwrap();
        assert_eq!(parsed, RawParameters::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed = RawParameters::from_toml("branch_name = \"trunk\"\n").unwrap();
        assert_eq!(parsed.branch_name, "trunk");
        assert_eq!(parsed.sql_dialect, "mysql");
    }

    #[test]
    fn test_unknown_key_in_file_is_rejected() {
        assert!(RawParameters::from_toml("branch = \"main\"\n").is_err());
    }

    #[test]
    fn test_overrides_replace_values() {
        let params = RawParameters::default()
            .with_overrides([("sql_dialect", "postgres"), ("tfsec_exclude_list", "a,b")])
            .unwrap();
        assert_eq!(params.sql_dialect, "postgres");
        assert_eq!(params.tfsec_exclude_list, "a,b");
    }

    #[test]
    fn test_unknown_override_suggests_key() {
        let err = RawParameters::default()
            .with_overrides([("sql_dialet", "postgres")])
            .unwrap_err();
        assert!(err.to_string().contains("did you mean 'sql_dialect'"));
    }

    #[test]
    fn test_parse_override_argument() {
        assert_eq!(parse_override("a=b=c").unwrap(), ("a", "b=c"));
        assert_eq!(parse_override("tfsec_exclude_list=").unwrap(), ("tfsec_exclude_list", ""));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_keys_lists_every_field() {
        let keys = RawParameters::keys();
        assert_eq!(keys.len(), 17);
        assert!(keys.contains(&"jshint_config_list".to_string()));
    }
}
