//! Self-scan of a synthesized template against a subset of the AwsSolutions
//! rule pack. Enabled with `synth --nag-checks`; any error-level finding
//! fails the synth.

use super::{Template, TemplateResource};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum NagLevel {
    Warning,
    Error,
}

impl fmt::Display for NagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NagLevel::Warning => write!(f, "Warning"),
            NagLevel::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NagFinding {
    pub rule: &'static str,
    pub level: NagLevel,
    pub resource: String,
    pub message: &'static str,
}

impl fmt::Display for NagFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] AwsSolutions-{}: {}: {}",
            self.level, self.rule, self.resource, self.message
        )
    }
}

struct NagRule {
    id: &'static str,
    level: NagLevel,
    resource_type: &'static str,
    message: &'static str,
    violated: fn(&Template, &str, &TemplateResource) -> bool,
}

const BUCKET: &str = "AWS::S3::Bucket";
const BUCKET_POLICY: &str = "AWS::S3::BucketPolicy";
const ROLE: &str = "AWS::IAM::Role";
const PROJECT: &str = "AWS::CodeBuild::Project";

fn rules() -> [NagRule; 6] {
    [
        NagRule {
            id: "S1",
            level: NagLevel::Error,
            resource_type: BUCKET,
            message: "The S3 Bucket has server access logs disabled.",
            violated: |_, _, r| r.properties.get("LoggingConfiguration").is_none(),
        },
        NagRule {
            id: "S2",
            level: NagLevel::Error,
            resource_type: BUCKET,
            message: "The S3 Bucket does not have public access restricted and blocked.",
            violated: |_, _, r| !blocks_public_access(&r.properties),
        },
        NagRule {
            id: "S10",
            level: NagLevel::Error,
            resource_type: BUCKET,
            message: "The S3 Bucket or bucket policy does not require requests to use SSL.",
            violated: |t, id, _| !has_secure_transport_policy(t, id),
        },
        NagRule {
            id: "IAM5",
            level: NagLevel::Error,
            resource_type: ROLE,
            message: "The IAM entity contains wildcard permissions.",
            violated: |_, _, r| policy_statements(&r.properties).any(statement_has_wildcard),
        },
        NagRule {
            id: "CB3",
            level: NagLevel::Warning,
            resource_type: PROJECT,
            message: "The CodeBuild project has privileged mode enabled.",
            violated: |_, _, r| {
                r.properties.pointer("/Environment/PrivilegedMode") == Some(&Value::Bool(true))
            },
        },
        NagRule {
            id: "CB4",
            level: NagLevel::Error,
            resource_type: PROJECT,
            message: "The CodeBuild project does not use an AWS KMS key for encryption.",
            violated: |_, _, r| r.properties.get("EncryptionKey").is_none(),
        },
    ]
}

fn blocks_public_access(properties: &Value) -> bool {
    let Some(block) = properties.get("PublicAccessBlockConfiguration") else {
        return false;
    };
    [
        "BlockPublicAcls",
        "BlockPublicPolicy",
        "IgnorePublicAcls",
        "RestrictPublicBuckets",
    ]
    .iter()
    .all(|key| block.get(key) == Some(&Value::Bool(true)))
}

fn refers_to(value: &Value, logical_id: &str) -> bool {
    match value {
        Value::Object(map) => {
            map.get("Ref").and_then(Value::as_str) == Some(logical_id)
                || map.values().any(|v| refers_to(v, logical_id))
        }
        Value::Array(items) => items.iter().any(|v| refers_to(v, logical_id)),
        _ => false,
    }
}

fn has_secure_transport_policy(template: &Template, bucket: &str) -> bool {
    template.resources.values().any(|resource| {
        resource.kind == BUCKET_POLICY
            && resource
                .properties
                .get("Bucket")
                .is_some_and(|b| refers_to(b, bucket))
            && resource
                .properties
                .pointer("/PolicyDocument/Statement")
                .and_then(Value::as_array)
                .is_some_and(|statements| {
                    statements.iter().any(|s| {
                        s.get("Effect").and_then(Value::as_str) == Some("Deny")
                            && s.pointer("/Condition/Bool/aws:SecureTransport")
                                .is_some_and(|v| v == "false" || v == &Value::Bool(false))
                    })
                })
    })
}

fn policy_statements(properties: &Value) -> impl Iterator<Item = &Value> {
    properties
        .get("Policies")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|policy| policy.pointer("/PolicyDocument/Statement"))
        .filter_map(Value::as_array)
        .flatten()
}

fn statement_has_wildcard(statement: &Value) -> bool {
    ["Action", "Resource"]
        .iter()
        .filter_map(|key| statement.get(key))
        .any(contains_wildcard)
}

// Only literal strings count; a wildcard spliced into an Fn::Join still lands
// in one of its string parts.
fn contains_wildcard(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('*'),
        Value::Array(items) => items.iter().any(contains_wildcard),
        Value::Object(map) => map.values().any(contains_wildcard),
        _ => false,
    }
}

/// Check every resource of `template`. Findings are ordered by logical id,
/// then by rule.
pub fn check(template: &Template) -> Vec<NagFinding> {
    let rules = rules();
    let mut findings = Vec::new();
    for (logical_id, resource) in &template.resources {
        for rule in rules.iter().filter(|r| r.resource_type == resource.kind) {
            if (rule.violated)(template, logical_id, resource) {
                findings.push(NagFinding {
                    rule: rule.id,
                    level: rule.level,
                    resource: logical_id.clone(),
                    message: rule.message,
                });
            }
        }
    }
    findings
}

pub fn error_count(findings: &[NagFinding]) -> usize {
    findings
        .iter()
        .filter(|f| f.level == NagLevel::Error)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};
    use crate::resources::RetentionLayout;
    use serde_json::json;

    fn template() -> Template {
        let config = resolve(&RawParameters {
            account_id: "123456789012".to_string(),
            ..Default::default()
        })
        .unwrap();
        Template::synthesize(&config, RetentionLayout::Parameterized).unwrap()
    }

    fn rules_for<'a>(findings: &'a [NagFinding], resource: &str) -> Vec<&'a str> {
        findings
            .iter()
            .filter(|f| f.resource == resource)
            .map(|f| f.rule)
            .collect()
    }

    #[test]
    fn test_bucket_findings() {
        let template = template();
        let findings = check(&template);
        let bucket = template
            .resources
            .iter()
            .find(|(_, r)| r.kind == BUCKET)
            .map(|(id, _)| id.clone())
            .unwrap();
        assert_eq!(rules_for(&findings, &bucket), vec!["S1", "S10"]);
    }

    #[test]
    fn test_build_projects_lack_kms_key_but_are_unprivileged() {
        let template = template();
        let findings = check(&template);
        let projects: Vec<&String> = template
            .resources
            .iter()
            .filter(|(_, r)| r.kind == PROJECT)
            .map(|(id, _)| id)
            .collect();
        assert!(!projects.is_empty());
        for project in projects {
            assert_eq!(rules_for(&findings, project), vec!["CB4"], "{project}");
        }
    }

    #[test]
    fn test_wildcard_actions_flag_roles() {
        let findings = check(&template());
        assert!(findings.iter().any(|f| f.rule == "IAM5"));
        assert!(error_count(&findings) > 0);
    }

    #[test]
    fn test_secure_transport_policy_clears_s10() {
        let mut template = template();
        let bucket = template
            .resources
            .iter()
            .find(|(_, r)| r.kind == BUCKET)
            .map(|(id, _)| id.clone())
            .unwrap();
        template.resources.insert(
            format!("{bucket}Policy"),
            TemplateResource {
                kind: BUCKET_POLICY.to_string(),
                condition: None,
                depends_on: Vec::new(),
                deletion_policy: None,
                update_replace_policy: None,
                properties: json!({
                    "Bucket": { "Ref": bucket },
                    "PolicyDocument": {
                        "Statement": [{
                            "Effect": "Deny",
                            "Principal": { "AWS": "*" },
                            "Action": "s3:*",
                            "Condition": { "Bool": { "aws:SecureTransport": "false" } }
                        }]
                    }
                }),
            },
        );
        let findings = check(&template);
        assert_eq!(rules_for(&findings, &bucket), vec!["S1"]);
    }

    #[test]
    fn test_privileged_project_is_a_warning() {
        let mut template = template();
        let project = template
            .resources
            .values_mut()
            .find(|r| r.kind == PROJECT)
            .unwrap();
        project.properties["Environment"]["PrivilegedMode"] = json!(true);
        project.properties["EncryptionKey"] = json!("alias/aws/s3");

        let findings = check(&template);
        let cb3: Vec<&NagFinding> = findings.iter().filter(|f| f.rule == "CB3").collect();
        assert_eq!(cb3.len(), 1);
        assert_eq!(cb3[0].level, NagLevel::Warning);
        assert!(cb3[0].to_string().starts_with("[Warning] AwsSolutions-CB3: "));
    }

    #[test]
    fn test_findings_are_ordered_by_resource() {
        let findings = check(&template());
        let ids: Vec<&str> = findings.iter().map(|f| f.resource.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
