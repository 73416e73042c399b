//! Scan action registry.
//!
//! Every scanner is described by a [`ScanActionDescriptor`]: the commands a
//! build project runs, and how its exit status is interpreted. The catalogue
//! is fixed and ordered; descriptors are built once from the resolved
//! configuration and never change afterwards.

pub mod buildspec;
pub mod cdk_nag;
pub mod cloudformation;
pub mod config_rules;
pub mod javascript;
pub mod python;
pub mod secrets;
pub mod semgrep;
pub mod sql;
pub mod terraform;
pub mod vulnerability;

pub use buildspec::{BuildSpec, Phase, Phases, BUCKET_PLACEHOLDER};

use crate::config::PipelineConfiguration;
use crate::execution::log_file_name;
use crate::outcome::Outcome;
use serde::Serialize;
use tracing::debug;

pub const SCAN_TIMEOUT_MINUTES: u32 = 5;
pub const SCAN_QUEUED_TIMEOUT_MINUTES: u32 = 15;

/// Catalogue order. Shellcheck is deliberately absent.
pub const ACTION_NAMES: [&str; 13] = [
    "Bandit",
    "CdkNagForCdk",
    "CdkNagForCfts",
    "CfnNag",
    "Checkov",
    "Flake8",
    "GitLeaks",
    "JSHint",
    "RdkUnitTest",
    "Semgrep",
    "SqlFluff",
    "Tfsec",
    "Trivy",
];

/// One scan step: commands plus exit-code semantics.
///
/// Exit code 0 means clean; anything else means flagged. A crashed tool and
/// a tool that found violations look the same at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanActionDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub install: Vec<String>,
    pub build: Vec<String>,
    pub pre_report: Vec<String>,
    /// When false the action reports findings but always finishes clean.
    pub fails_on_findings: bool,
    pub timeout_minutes: u32,
}

impl ScanActionDescriptor {
    pub(crate) fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            install: Vec::new(),
            build: Vec::new(),
            pre_report: Vec::new(),
            fails_on_findings: true,
            timeout_minutes: SCAN_TIMEOUT_MINUTES,
        }
    }

    pub(crate) fn install<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install.extend(commands.into_iter().map(Into::into));
        self
    }

    pub(crate) fn build<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub(crate) fn pre_report<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_report.extend(commands.into_iter().map(Into::into));
        self
    }

    pub(crate) fn report_only(mut self) -> Self {
        self.fails_on_findings = false;
        self
    }

    /// `<name>.log`
    pub fn output_artifact(&self) -> String {
        log_file_name(self.name)
    }

    /// `<name>-<pipeline>`
    pub fn project_name(&self, pipeline: &str) -> String {
        format!("{}-{}", self.name, pipeline)
    }

    /// `/<pipeline>/<name>`
    pub fn log_group_name(&self, pipeline: &str) -> String {
        format!("/{}/{}", pipeline, self.name)
    }

    pub fn build_spec(&self, bucket: &str) -> BuildSpec {
        BuildSpec::for_scan(
            self.name,
            &self.install,
            &self.build,
            &self.pre_report,
            bucket,
        )
    }

    /// Fold the exit codes of the tool invocations into the action's outcome.
    pub fn evaluate<I>(&self, exit_codes: I) -> Outcome
    where
        I: IntoIterator<Item = i32>,
    {
        if !self.fails_on_findings {
            return Outcome::Clean;
        }
        exit_codes.into_iter().map(Outcome::from_exit_code).collect()
    }
}

/// Build the full catalogue for `config`, in [`ACTION_NAMES`] order.
pub fn registry(config: &PipelineConfiguration) -> Vec<ScanActionDescriptor> {
    let tools = &config.tools;
    let actions = vec![
        python::bandit(),
        cdk_nag::for_cdk(),
        cdk_nag::for_cfts(),
        cloudformation::cfn_nag(tools),
        terraform::checkov(tools),
        python::flake8(),
        secrets::gitleaks(),
        javascript::jshint(tools),
        config_rules::rdk_unit_test(tools),
        semgrep::semgrep(tools),
        sql::sqlfluff(tools),
        terraform::tfsec(tools),
        vulnerability::trivy(),
    ];
    debug!(count = actions.len(), "built scan action registry");
    actions
}

/// Look up one descriptor by name (case-insensitive).
pub fn find<'a>(actions: &'a [ScanActionDescriptor], name: &str) -> Option<&'a ScanActionDescriptor> {
    actions.iter().find(|a| a.name.eq_ignore_ascii_case(name))
}
