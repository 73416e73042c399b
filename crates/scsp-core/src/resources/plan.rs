use super::condition::{Condition, ConditionPair, NamedCondition};
use super::kind::{
    removal_policy, BuildProjectSpec, PolicyStatement, ResourceKind, Token,
    IMAGE_AMAZON_LINUX_2_3, IMAGE_AMAZON_LINUX_2_4,
};
use super::repository::{select_repository, RepositoryHandle};
use super::tree::{ConditionalResource, FlatResource, ResourceNode};
use crate::actions::{registry, ScanActionDescriptor, BUCKET_PLACEHOLDER, SCAN_QUEUED_TIMEOUT_MINUTES};
use crate::aggregate::{
    AggregationStep, AGGREGATION_QUEUED_TIMEOUT_MINUTES, AGGREGATION_TIMEOUT_MINUTES,
    SUMMARY_POLICY_NAME, SUMMARY_ROLE_NAME,
};
use crate::config::{PipelineConfiguration, RetentionMode, PARAM_RETENTION};
use crate::error::PlanError;
use crate::pipeline::{assemble, PipelineTopology};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ARTIFACT_BUCKET: &str = "artifactBucket";
pub const PIPELINE_ROLE: &str = "CodePipelineRole";
pub const SCAN_ROLE: &str = "ScanProjectRole";
pub const SUMMARY_ROLE: &str = "summaryUploadRole";
pub const ZIP_PROJECT: &str = "zipProject";
pub const PIPELINE_RESOURCE: &str = "CodePipeline";

pub const RETAIN_GROUP: &str = "RetainResources";
pub const DELETE_GROUP: &str = "DeleteResources";
pub const PINNED_GROUP: &str = "PipelineResources";
pub const RETAIN_CONDITION: &str = "RetainCondition";
pub const DELETE_CONDITION: &str = "DeleteCondition";

/// `RetainCondition` / `DeleteCondition`, both derived from one test on
/// the retention parameter.
pub fn retention_pair() -> ConditionPair {
    ConditionPair::split(
        Condition::equals(PARAM_RETENTION, RetentionMode::Retain.as_str()),
        RETAIN_CONDITION,
        DELETE_CONDITION,
    )
}

/// How the retention choice shows up in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionLayout {
    /// One unconditioned resource set with a fixed removal policy.
    Pinned(RetentionMode),
    /// Both resource sets, each gated by one side of [`retention_pair`],
    /// so the policy can still be chosen at deploy time.
    Parameterized,
}

/// Everything declared for one configuration.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub roots: Vec<ResourceNode>,
    pub repository: RepositoryHandle,
    pub topology: PipelineTopology,
    pub scans: Vec<ScanActionDescriptor>,
}

impl Declaration {
    pub fn resources(&self) -> impl Iterator<Item = FlatResource<'_>> {
        self.roots.iter().flat_map(ResourceNode::flatten)
    }

    /// Every distinct condition referenced by a resource, keyed by name.
    pub fn conditions(&self) -> BTreeMap<String, NamedCondition> {
        self.resources()
            .filter_map(|flat| flat.resource.condition.clone())
            .map(|condition| (condition.name.clone(), condition))
            .collect()
    }
}

fn scan_logs_id(scan: &ScanActionDescriptor) -> String {
    format!("{}Logs", scan.name)
}

fn scan_project_id(scan: &ScanActionDescriptor) -> String {
    format!("{}Project", scan.name)
}

fn bucket_objects() -> Token {
    Token::Join(vec![Token::arn_of(ARTIFACT_BUCKET), Token::literal("/*")])
}

fn scan_role(scans: &[ScanActionDescriptor]) -> ConditionalResource {
    let log_groups = scans.iter().map(|s| Token::arn_of(&scan_logs_id(s))).collect();
    ConditionalResource::new(
        SCAN_ROLE,
        ResourceKind::Role {
            service: "codebuild.amazonaws.com".to_string(),
            description: "Role assumed by the scan build projects".to_string(),
            policy_name: "scanPolicy".to_string(),
            statements: vec![
                PolicyStatement::allow(
                    &["s3:GetBucket*", "s3:GetObject*", "s3:List*", "s3:PutObject"],
                    vec![Token::arn_of(ARTIFACT_BUCKET), bucket_objects()],
                ),
                PolicyStatement::allow(
                    &["logs:CreateLogStream", "logs:PutLogEvents"],
                    log_groups,
                ),
            ],
        },
    )
}

fn pipeline_role(repository: &RepositoryHandle, projects: &[String]) -> ConditionalResource {
    let project_arns = projects
        .iter()
        .map(|name| Token::regional_arn("codebuild", &format!("project/{}", name)))
        .collect();
    ConditionalResource::new(
        PIPELINE_ROLE,
        ResourceKind::Role {
            service: "codepipeline.amazonaws.com".to_string(),
            description: "Role assumed by the scanning pipeline".to_string(),
            policy_name: "pipelinePolicy".to_string(),
            statements: vec![
                PolicyStatement::allow(
                    &[
                        "codecommit:CancelUploadArchive",
                        "codecommit:GetBranch",
                        "codecommit:GetCommit",
                        "codecommit:GetUploadArchiveStatus",
                        "codecommit:UploadArchive",
                    ],
                    vec![repository.arn.clone()],
                ),
                PolicyStatement::allow(
                    &["codebuild:BatchGetBuilds", "codebuild:StartBuild"],
                    project_arns,
                ),
                PolicyStatement::allow(
                    &[
                        "s3:Abort*",
                        "s3:DeleteObject*",
                        "s3:GetBucket*",
                        "s3:GetObject*",
                        "s3:List*",
                        "s3:PutObject*",
                    ],
                    vec![Token::arn_of(ARTIFACT_BUCKET), bucket_objects()],
                ),
            ],
        },
    )
}

fn spliced_build_spec(yaml: &str) -> Token {
    Token::splice(yaml, BUCKET_PLACEHOLDER, &Token::Ref(ARTIFACT_BUCKET.to_string()))
}

/// The full downstream resource set for one removal policy.
fn downstream(
    config: &PipelineConfiguration,
    removal: RetentionMode,
    scans: &[ScanActionDescriptor],
    topology: &PipelineTopology,
) -> Result<Vec<ResourceNode>, PlanError> {
    let pipeline = config.pipeline_name();
    let binding = select_repository(config, removal);
    let mut children = Vec::new();
    let mut pipeline_depends = Vec::new();

    if let Some(declaration) = binding.declaration {
        pipeline_depends.push(RepositoryHandle::local_resource_id());
        children.push(declaration);
    }
    children.push(ResourceNode::resource(
        ConditionalResource::new(ARTIFACT_BUCKET, ResourceKind::ArtifactBucket).with_removal(removal),
    ));

    let aggregation = AggregationStep::new(config, scans.len());
    let mut project_names: Vec<String> = scans.iter().map(|s| s.project_name(&pipeline)).collect();
    project_names.push(aggregation.name.clone());
    children.push(ResourceNode::resource(pipeline_role(&binding.handle, &project_names)));
    children.push(ResourceNode::resource(scan_role(scans)));

    for scan in scans {
        let logs_id = scan_logs_id(scan);
        let project_id = scan_project_id(scan);
        children.push(ResourceNode::resource(
            ConditionalResource::new(
                logs_id.clone(),
                ResourceKind::LogGroup {
                    name: scan.log_group_name(&pipeline),
                },
            )
            .with_removal(removal),
        ));
        let yaml = scan.build_spec(BUCKET_PLACEHOLDER).to_yaml()?;
        children.push(ResourceNode::resource(ConditionalResource::new(
            project_id.clone(),
            ResourceKind::BuildProject(BuildProjectSpec {
                name: scan.project_name(&pipeline),
                description: scan.description.to_string(),
                role: Token::arn_of(SCAN_ROLE),
                log_group: Some(Token::Ref(logs_id)),
                build_spec: spliced_build_spec(&yaml),
                timeout_minutes: scan.timeout_minutes,
                queued_timeout_minutes: SCAN_QUEUED_TIMEOUT_MINUTES,
                image: IMAGE_AMAZON_LINUX_2_4,
            }),
        )));
        pipeline_depends.push(project_id);
    }

    children.push(ResourceNode::resource(ConditionalResource::new(
        SUMMARY_ROLE,
        ResourceKind::Role {
            service: "codebuild.amazonaws.com".to_string(),
            description: format!("{} for {}", SUMMARY_ROLE_NAME, aggregation.name),
            policy_name: SUMMARY_POLICY_NAME.to_string(),
            statements: aggregation.role_statements(&Token::arn_of(ARTIFACT_BUCKET)),
        },
    )));
    let yaml = aggregation.build_spec(BUCKET_PLACEHOLDER).to_yaml()?;
    children.push(ResourceNode::resource(ConditionalResource::new(
        ZIP_PROJECT,
        ResourceKind::BuildProject(BuildProjectSpec {
            name: aggregation.name.clone(),
            description: aggregation.description().to_string(),
            role: Token::arn_of(SUMMARY_ROLE),
            log_group: None,
            build_spec: spliced_build_spec(&yaml),
            timeout_minutes: AGGREGATION_TIMEOUT_MINUTES,
            queued_timeout_minutes: AGGREGATION_QUEUED_TIMEOUT_MINUTES,
            image: IMAGE_AMAZON_LINUX_2_3,
        }),
    )));
    pipeline_depends.push(ZIP_PROJECT.to_string());

    children.push(ResourceNode::resource(
        ConditionalResource::new(
            PIPELINE_RESOURCE,
            ResourceKind::Pipeline {
                name: pipeline,
                role: Token::arn_of(PIPELINE_ROLE),
                bucket: Token::Ref(ARTIFACT_BUCKET.to_string()),
                stages: topology.to_declaration(),
            },
        )
        .depending_on(pipeline_depends),
    ));

    debug!(
        removal = removal_policy(removal),
        resources = children.iter().map(ResourceNode::resource_count).sum::<usize>(),
        "declared downstream resources"
    );
    Ok(children)
}

/// Declare every resource for `config` in the requested layout.
pub fn declare(
    config: &PipelineConfiguration,
    layout: RetentionLayout,
) -> Result<Declaration, PlanError> {
    let scans = registry(config);
    let repository = select_repository(config, config.retention).handle;
    let topology = assemble(config, &repository, &scans)?;

    let roots = match layout {
        RetentionLayout::Pinned(mode) => vec![ResourceNode::group(
            PINNED_GROUP,
            downstream(config, mode, &scans, &topology)?,
        )],
        RetentionLayout::Parameterized => {
            let pair = retention_pair();
            let mut retain = ResourceNode::group(
                RETAIN_GROUP,
                downstream(config, RetentionMode::Retain, &scans, &topology)?,
            );
            retain.apply_condition(pair.holds());
            let mut delete = ResourceNode::group(
                DELETE_GROUP,
                downstream(config, RetentionMode::Delete, &scans, &topology)?,
            );
            delete.apply_condition(pair.fails());
            vec![retain, delete]
        }
    };

    Ok(Declaration {
        roots,
        repository,
        topology,
        scans,
    })
}

/// One resource of a resolved plan, independent of which group declared it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedResource {
    /// Id relative to its top-level group.
    pub id: String,
    pub type_name: &'static str,
    pub label: &'static str,
    pub physical_name: Option<String>,
    pub removal: Option<RetentionMode>,
}

impl PlannedResource {
    pub fn from_flat(flat: &FlatResource<'_>) -> Self {
        let resource = flat.resource;
        Self {
            id: flat.local_id(),
            type_name: resource.kind.type_name(),
            label: resource.kind.label(),
            physical_name: resource.kind.physical_name().map(str::to_string),
            removal: resource.removal,
        }
    }
}

/// The single live resource set for a fully known configuration.
#[derive(Debug, Clone)]
pub struct ResourcePlan {
    pub repository: RepositoryHandle,
    pub retention: RetentionMode,
    pub topology: PipelineTopology,
    pub scans: Vec<ScanActionDescriptor>,
    pub resources: Vec<PlannedResource>,
}

impl ResourcePlan {
    /// Every choice is already known, so the retention branch is taken
    /// here and only the matching resource set is built.
    pub fn resolve(config: &PipelineConfiguration) -> Result<Self, PlanError> {
        let declaration = declare(config, RetentionLayout::Pinned(config.retention))?;
        let values = config.parameter_values();
        let resources: Vec<PlannedResource> = declaration
            .resources()
            .filter(|flat| flat.resource.is_live(&values))
            .map(|flat| PlannedResource::from_flat(&flat))
            .collect();

        info!(
            pipeline = %declaration.topology.name,
            repository = %declaration.repository.name,
            retention = %config.retention,
            resources = resources.len(),
            "resolved resource plan"
        );
        Ok(Self {
            repository: declaration.repository,
            retention: config.retention,
            topology: declaration.topology,
            scans: declaration.scans,
            resources,
        })
    }

    pub fn find(&self, id: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Resource count per kind label.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for resource in &self.resources {
            *counts.entry(resource.label).or_insert(0) += 1;
        }
        counts
    }
}
