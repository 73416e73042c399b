//! Declarative template output.
//!
//! A [`Template`] renders a [`Declaration`] in CloudFormation form:
//! parameters, conditions, resources with prefixed logical ids, and
//! outputs. It keeps the typed declaration so the live subset for a given
//! set of parameter values can be computed without re-parsing.
//!
//! The repository choice is made at synth time. Its two parameters are
//! still rendered so the deploy form shows them, but each only accepts the
//! synthesized value, and the `NoNewAndExisting` rule rejects deployments
//! that set both or neither.

pub mod nag;

use crate::config::{
    PipelineConfiguration, RetentionMode, PARAM_BRANCH, PARAM_EXISTING_REPO, PARAM_NEW_REPO,
    PARAM_RETENTION,
};
use crate::error::{PlanError, TemplateError};
use crate::resources::{
    declare, removal_policy, Condition, Declaration, ParameterValues, PlannedResource,
    RetentionLayout, PIPELINE_RESOURCE,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub kind: String,
    pub description: String,
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

impl TemplateParameter {
    fn string(description: &str, default: impl Into<String>) -> Self {
        Self {
            kind: "String".to_string(),
            description: description.to_string(),
            default: default.into(),
            allowed_values: None,
        }
    }

    /// A parameter whose only accepted value is its default.
    fn fixed(description: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            allowed_values: Some(vec![value.clone()]),
            ..Self::string(description, value)
        }
    }

    fn accepts(&self, value: &str) -> bool {
        self.allowed_values
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|v| v == value))
    }
}

/// Deploy-time assertion over parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRule {
    pub name: &'static str,
    pub assertion: Condition,
    pub description: &'static str,
}

impl ParameterRule {
    fn render(&self) -> Value {
        json!({
            "Assertions": [{
                "Assert": self.assertion.to_intrinsic(),
                "AssertDescription": self.description
            }]
        })
    }
}

/// `NoNewAndExisting`: exactly one of the existing ARN and the new
/// repository name is set.
pub fn repository_xor_rule() -> ParameterRule {
    let no_arn = Condition::equals(PARAM_EXISTING_REPO, "");
    let no_name = Condition::equals(PARAM_NEW_REPO, "");
    ParameterRule {
        name: "NoNewAndExisting",
        assertion: Condition::And(vec![
            Condition::And(vec![no_arn.clone(), no_name.clone()]).negate(),
            Condition::And(vec![no_arn.negate(), no_name.negate()]).negate(),
        ]),
        description: "Cannot specify both a new and existing repository. ",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
    pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub metadata: Value,
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, Value>,
    pub resources: BTreeMap<String, TemplateResource>,
    pub outputs: BTreeMap<String, TemplateOutput>,
    #[serde(skip)]
    declaration: Declaration,
    #[serde(skip)]
    checks: Vec<ParameterRule>,
}

fn parameters(
    config: &PipelineConfiguration,
    layout: RetentionLayout,
) -> BTreeMap<String, TemplateParameter> {
    let values = config.parameter_values();
    let value = |name: &str| values.get(name).cloned().unwrap_or_default();

    let mut params = BTreeMap::new();
    params.insert(
        PARAM_BRANCH.to_string(),
        TemplateParameter::string("Branch the pipeline scans", value(PARAM_BRANCH)),
    );
    params.insert(
        PARAM_EXISTING_REPO.to_string(),
        TemplateParameter::fixed(
            "ARN of the existing CodeCommit repository to scan. Fixed when the template is synthesized",
            value(PARAM_EXISTING_REPO),
        ),
    );
    params.insert(
        PARAM_NEW_REPO.to_string(),
        TemplateParameter::fixed(
            "Name of the repository to create. Fixed when the template is synthesized",
            value(PARAM_NEW_REPO),
        ),
    );
    if layout == RetentionLayout::Parameterized {
        params.insert(
            PARAM_RETENTION.to_string(),
            TemplateParameter {
                allowed_values: Some(
                    RetentionMode::VALUES
                        .iter()
                        .map(|(name, _)| name.to_string())
                        .collect(),
                ),
                ..TemplateParameter::string(
                    "Whether the repository, bucket and log groups are kept on teardown",
                    value(PARAM_RETENTION),
                )
            },
        );
    }
    params
}

fn metadata(layout: RetentionLayout) -> Value {
    let mut groups = vec![
        json!({ "Label": { "default": "Source" }, "Parameters": [PARAM_BRANCH] }),
        json!({
            "Label": { "default": "Repository" },
            "Parameters": [PARAM_EXISTING_REPO, PARAM_NEW_REPO]
        }),
    ];
    if layout == RetentionLayout::Parameterized {
        groups.push(json!({
            "Label": { "default": "Teardown" },
            "Parameters": [PARAM_RETENTION]
        }));
    }
    json!({ "AWS::CloudFormation::Interface": { "ParameterGroups": groups } })
}

impl Template {
    /// Declare and render the resources for `config`.
    pub fn synthesize(
        config: &PipelineConfiguration,
        layout: RetentionLayout,
    ) -> Result<Self, PlanError> {
        let declaration = declare(config, layout)?;

        let conditions = declaration
            .conditions()
            .into_iter()
            .map(|(name, condition)| (name, condition.expr.to_intrinsic()))
            .collect();

        let mut resources = BTreeMap::new();
        let mut outputs = BTreeMap::new();
        for flat in declaration.resources() {
            let resource = flat.resource;
            let logical_id = flat.logical_id();
            let policy = resource.removal.map(|mode| removal_policy(mode).to_string());
            resources.insert(
                logical_id.clone(),
                TemplateResource {
                    kind: resource.kind.type_name().to_string(),
                    condition: resource.condition.as_ref().map(|c| c.name.clone()),
                    depends_on: resource
                        .depends_on
                        .iter()
                        .map(|id| format!("{}{}", flat.scope, id))
                        .collect(),
                    deletion_policy: policy.clone(),
                    update_replace_policy: policy,
                    properties: resource.kind.properties(flat.scope),
                },
            );

            if resource.id == PIPELINE_RESOURCE {
                outputs.insert(
                    format!("{}PipelineName", flat.scope),
                    TemplateOutput {
                        description: "Name of the scanning pipeline".to_string(),
                        condition: resource.condition.as_ref().map(|c| c.name.clone()),
                        value: json!({ "Ref": logical_id }),
                    },
                );
            }
        }

        debug!(
            resources = resources.len(),
            conditions = declaration.conditions().len(),
            "synthesized template"
        );

        let checks = vec![repository_xor_rule()];
        let rules = checks
            .iter()
            .map(|rule| (rule.name.to_string(), rule.render()))
            .collect();

        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            description: format!(
                "Simple Code Scanning Pipeline for {} ({})",
                declaration.repository.name, config.branch
            ),
            metadata: metadata(layout),
            parameters: parameters(config, layout),
            rules,
            conditions,
            resources,
            outputs,
            declaration,
            checks,
        })
    }

    pub fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    /// Effective deploy values: defaults filled in, then checked against
    /// allowed values and rules the way a deployment would check them.
    /// Values for parameters the template does not declare are dropped.
    pub fn check_parameters(&self, values: &ParameterValues) -> Result<ParameterValues, TemplateError> {
        let mut effective = ParameterValues::new();
        for (name, parameter) in &self.parameters {
            let value = values.get(name).unwrap_or(&parameter.default);
            if !parameter.accepts(value) {
                return Err(TemplateError::DisallowedParameter {
                    parameter: name.clone(),
                    value: value.clone(),
                    allowed: parameter
                        .allowed_values
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .map(|v| format!("'{}'", v))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            effective.insert(name.clone(), value.clone());
        }

        if let Some(rule) = self.checks.iter().find(|rule| !rule.assertion.evaluate(&effective)) {
            return Err(TemplateError::RuleViolation {
                rule: rule.name.to_string(),
                description: rule.description.trim().to_string(),
            });
        }
        Ok(effective)
    }

    /// Resources that would exist for `values`, in declaration order.
    /// Values a deployment would reject are an error.
    pub fn live_resources(&self, values: &ParameterValues) -> Result<Vec<PlannedResource>, TemplateError> {
        let effective = self.check_parameters(values)?;
        Ok(self
            .declaration
            .resources()
            .filter(|flat| flat.resource.is_live(&effective))
            .map(|flat| PlannedResource::from_flat(&flat))
            .collect())
    }

    pub fn to_json(&self) -> Result<String, TemplateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, TemplateError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
