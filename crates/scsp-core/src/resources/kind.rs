use crate::config::{RetentionMode, StarterBundle, STARTER_BUCKET};
use serde_json::{json, Value};
use std::fmt;

pub const IMAGE_AMAZON_LINUX_2_3: &str = "aws/codebuild/amazonlinux2-x86_64-standard:3.0";
pub const IMAGE_AMAZON_LINUX_2_4: &str = "aws/codebuild/amazonlinux2-x86_64-standard:4.0";
pub const COMPUTE_SMALL: &str = "BUILD_GENERAL1_SMALL";

/// A value that may refer to another resource in the same group.
///
/// Resource ids inside `Ref`/`GetAtt` are relative to the enclosing
/// top-level group and get that group's prefix when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Ref(String),
    GetAtt(String, String),
    /// Deployment pseudo parameter such as `AWS::Region`.
    Pseudo(&'static str),
    Join(Vec<Token>),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    pub fn arn_of(resource: &str) -> Self {
        Token::GetAtt(resource.to_string(), "Arn".to_string())
    }

    /// `arn:aws:<service>:<region>:<account>:<resource>`
    pub fn regional_arn(service: &str, resource: &str) -> Self {
        Token::Join(vec![
            Token::Literal(format!("arn:aws:{}:", service)),
            Token::Pseudo("AWS::Region"),
            Token::literal(":"),
            Token::Pseudo("AWS::AccountId"),
            Token::Literal(format!(":{}", resource)),
        ])
    }

    /// Replace every occurrence of `placeholder` in `text` with `token`.
    pub fn splice(text: &str, placeholder: &str, token: &Token) -> Self {
        if !text.contains(placeholder) {
            return Token::literal(text);
        }
        let mut parts = Vec::new();
        for (i, piece) in text.split(placeholder).enumerate() {
            if i > 0 {
                parts.push(token.clone());
            }
            if !piece.is_empty() {
                parts.push(Token::literal(piece));
            }
        }
        Token::Join(parts)
    }

    /// Resource ids this token points at.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Token::Literal(_) | Token::Pseudo(_) => Vec::new(),
            Token::Ref(id) | Token::GetAtt(id, _) => vec![id.as_str()],
            Token::Join(parts) => parts.iter().flat_map(Token::references).collect(),
        }
    }

    pub fn render(&self, scope: &str) -> Value {
        match self {
            Token::Literal(value) => json!(value),
            Token::Ref(id) => json!({ "Ref": format!("{}{}", scope, id) }),
            Token::GetAtt(id, attr) => json!({ "Fn::GetAtt": [format!("{}{}", scope, id), attr] }),
            Token::Pseudo(name) => json!({ "Ref": name }),
            Token::Join(parts) => json!({
                "Fn::Join": ["", parts.iter().map(|p| p.render(scope)).collect::<Vec<_>>()]
            }),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(value) => f.write_str(value),
            Token::Ref(id) => write!(f, "${{{}}}", id),
            Token::GetAtt(id, attr) => write!(f, "${{{}.{}}}", id, attr),
            Token::Pseudo(name) => write!(f, "${{{}}}", name),
            Token::Join(parts) => parts.iter().try_for_each(|p| write!(f, "{}", p)),
        }
    }
}

/// One `Allow` statement of an inline policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Token>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<Token>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    fn render(&self, scope: &str) -> Value {
        json!({
            "Effect": "Allow",
            "Action": self.actions,
            "Resource": self.resources.iter().map(|r| r.render(scope)).collect::<Vec<_>>(),
        })
    }
}

/// Managed build project backing one pipeline action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProjectSpec {
    pub name: String,
    pub description: String,
    pub role: Token,
    pub log_group: Option<Token>,
    /// Rendered build spec; bucket references already spliced in.
    pub build_spec: Token,
    pub timeout_minutes: u32,
    pub queued_timeout_minutes: u32,
    pub image: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Repository {
        name: String,
        starter: StarterBundle,
    },
    ArtifactBucket,
    Role {
        service: String,
        description: String,
        policy_name: String,
        statements: Vec<PolicyStatement>,
    },
    LogGroup {
        name: String,
    },
    BuildProject(BuildProjectSpec),
    Pipeline {
        name: String,
        role: Token,
        bucket: Token,
        stages: Value,
    },
}

impl ResourceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Repository { .. } => "AWS::CodeCommit::Repository",
            ResourceKind::ArtifactBucket => "AWS::S3::Bucket",
            ResourceKind::Role { .. } => "AWS::IAM::Role",
            ResourceKind::LogGroup { .. } => "AWS::Logs::LogGroup",
            ResourceKind::BuildProject(_) => "AWS::CodeBuild::Project",
            ResourceKind::Pipeline { .. } => "AWS::CodePipeline::Pipeline",
        }
    }

    /// Short label for terminal output.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Repository { .. } => "repository",
            ResourceKind::ArtifactBucket => "bucket",
            ResourceKind::Role { .. } => "role",
            ResourceKind::LogGroup { .. } => "log-group",
            ResourceKind::BuildProject(_) => "build-project",
            ResourceKind::Pipeline { .. } => "pipeline",
        }
    }

    /// Name fixed at declaration time, when the resource has one.
    pub fn physical_name(&self) -> Option<&str> {
        match self {
            ResourceKind::Repository { name, .. }
            | ResourceKind::LogGroup { name }
            | ResourceKind::Pipeline { name, .. } => Some(name),
            ResourceKind::BuildProject(spec) => Some(&spec.name),
            ResourceKind::ArtifactBucket | ResourceKind::Role { .. } => None,
        }
    }

    /// Resource ids referenced from this resource's properties.
    pub fn references(&self) -> Vec<&str> {
        match self {
            ResourceKind::Repository { .. }
            | ResourceKind::ArtifactBucket
            | ResourceKind::LogGroup { .. } => Vec::new(),
            ResourceKind::Role { statements, .. } => statements
                .iter()
                .flat_map(|s| s.resources.iter().flat_map(Token::references))
                .collect(),
            ResourceKind::BuildProject(spec) => {
                let mut refs = spec.role.references();
                if let Some(group) = &spec.log_group {
                    refs.extend(group.references());
                }
                refs.extend(spec.build_spec.references());
                refs
            }
            ResourceKind::Pipeline { role, bucket, .. } => {
                let mut refs = role.references();
                refs.extend(bucket.references());
                refs
            }
        }
    }

    pub fn properties(&self, scope: &str) -> Value {
        match self {
            ResourceKind::Repository { name, starter } => json!({
                "RepositoryName": name,
                "Code": {
                    "S3": { "Bucket": STARTER_BUCKET, "Key": starter.object_key() }
                }
            }),
            ResourceKind::ArtifactBucket => json!({
                "BucketEncryption": {
                    "ServerSideEncryptionConfiguration": [
                        { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
                    ]
                },
                "PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true
                },
                "VersioningConfiguration": { "Status": "Enabled" }
            }),
            ResourceKind::Role {
                service,
                description,
                policy_name,
                statements,
            } => {
                let mut props = json!({
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": service },
                            "Action": "sts:AssumeRole"
                        }]
                    },
                    "Description": description,
                    "MaxSessionDuration": 3600
                });
                if !statements.is_empty() {
                    props["Policies"] = json!([{
                        "PolicyName": policy_name,
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": statements.iter().map(|s| s.render(scope)).collect::<Vec<_>>()
                        }
                    }]);
                }
                props
            }
            ResourceKind::LogGroup { name } => json!({ "LogGroupName": name }),
            ResourceKind::BuildProject(spec) => {
                let mut props = json!({
                    "Name": spec.name,
                    "Description": spec.description,
                    "ServiceRole": spec.role.render(scope),
                    "Source": {
                        "Type": "CODEPIPELINE",
                        "BuildSpec": spec.build_spec.render(scope)
                    },
                    "Artifacts": { "Type": "CODEPIPELINE" },
                    "Environment": {
                        "Type": "LINUX_CONTAINER",
                        "ComputeType": COMPUTE_SMALL,
                        "Image": spec.image,
                        "PrivilegedMode": false
                    },
                    "TimeoutInMinutes": spec.timeout_minutes,
                    "QueuedTimeoutInMinutes": spec.queued_timeout_minutes
                });
                if let Some(group) = &spec.log_group {
                    props["LogsConfig"] = json!({
                        "CloudWatchLogs": { "Status": "ENABLED", "GroupName": group.render(scope) }
                    });
                }
                props
            }
            ResourceKind::Pipeline {
                name,
                role,
                bucket,
                stages,
            } => json!({
                "Name": name,
                "RoleArn": role.render(scope),
                "ArtifactStore": { "Type": "S3", "Location": bucket.render(scope) },
                "Stages": stages
            }),
        }
    }
}

/// `DeletionPolicy` / `UpdateReplacePolicy` value for a retention mode.
pub fn removal_policy(mode: RetentionMode) -> &'static str {
    match mode {
        RetentionMode::Retain => "Retain",
        RetentionMode::Delete => "Delete",
    }
}
