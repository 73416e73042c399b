use super::condition::{Condition, NamedCondition};
use super::kind::{ResourceKind, Token};
use super::tree::{ConditionalResource, ResourceNode};
use crate::config::{
    PipelineConfiguration, RepositorySelection, RetentionMode, StarterBundle, PARAM_EXISTING_REPO,
    PARAM_NEW_REPO,
};
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub const REPO_GROUP: &str = "repoObject";
pub const REPO_RESOURCE: &str = "CodeCommitRepository";

/// `CreateNewRepo`: true when no existing repository ARN was supplied.
pub fn create_new_repo() -> Condition {
    Condition::equals(PARAM_EXISTING_REPO, "")
}

/// Gate on the provisioned repository itself: a name must be present.
pub fn new_repo_exists() -> NamedCondition {
    NamedCondition::new(
        "NewRepoExists",
        Condition::equals(PARAM_NEW_REPO, "").negate(),
    )
}

/// Where the repository behind a [`RepositoryHandle`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum Provenance {
    Created { bundle: StarterBundle },
    Existing,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Created { bundle } => write!(f, "created (starter: {})", bundle.as_str()),
            Provenance::Existing => write!(f, "existing"),
        }
    }
}

/// The repository the pipeline reads from, whichever way it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub name: String,
    pub arn: Token,
    pub provenance: Provenance,
}

impl RepositoryHandle {
    pub fn local_resource_id() -> String {
        format!("{}{}", REPO_GROUP, REPO_RESOURCE)
    }
}

/// Repository handle plus the declaration that backs it, if any.
#[derive(Debug, Clone)]
pub struct RepositoryBinding {
    pub handle: RepositoryHandle,
    pub declaration: Option<ResourceNode>,
}

/// Bind the configured repository.
///
/// A new repository is declared (seeded from the starter bundle) and its
/// ARN is taken from the declared resource; an existing one is bound by ARN
/// and declares nothing.
pub fn select_repository(
    config: &PipelineConfiguration,
    removal: RetentionMode,
) -> RepositoryBinding {
    let name = config.repository_name();
    let binding = match &config.repository {
        RepositorySelection::New { .. } => {
            let repo = ConditionalResource::new(
                REPO_RESOURCE,
                ResourceKind::Repository {
                    name: name.clone(),
                    starter: config.starter_bundle,
                },
            )
            .with_removal(removal)
            .with_condition(new_repo_exists());
            RepositoryBinding {
                handle: RepositoryHandle {
                    name,
                    arn: Token::arn_of(&RepositoryHandle::local_resource_id()),
                    provenance: Provenance::Created {
                        bundle: config.starter_bundle,
                    },
                },
                declaration: Some(ResourceNode::group(
                    REPO_GROUP,
                    vec![ResourceNode::resource(repo)],
                )),
            }
        }
        RepositorySelection::Existing { arn } => RepositoryBinding {
            handle: RepositoryHandle {
                name,
                arn: Token::literal(arn.as_str()),
                provenance: Provenance::Existing,
            },
            declaration: None,
        },
    };
    debug!(
        repository = %binding.handle.name,
        provenance = %binding.handle.provenance,
        "bound pipeline repository"
    );
    binding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};

    fn config(existing: &str, new: &str) -> PipelineConfiguration {
        resolve(&RawParameters {
            existing_repo_arn: existing.to_string(),
            new_repo_name: new.to_string(),
            account_id: "123456789012".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_repository_is_declared() {
        let cfg = config("", "scsp-repo");
        assert!(create_new_repo().evaluate(&cfg.parameter_values()));

        let binding = select_repository(&cfg, RetentionMode::Delete);
        assert_eq!(binding.handle.name, "scsp-repo-123456789012");
        assert_eq!(
            binding.handle.arn,
            Token::arn_of("repoObjectCodeCommitRepository")
        );
        let node = binding.declaration.unwrap();
        let flat = node.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].resource.removal, Some(RetentionMode::Delete));
        assert!(flat[0].resource.is_live(&cfg.parameter_values()));
    }

    #[test]
    fn test_existing_repository_is_bound_by_arn() {
        let arn = "arn:aws:codecommit:eu-west-1:210987654321:legacy";
        let cfg = config(arn, "");
        assert!(!create_new_repo().evaluate(&cfg.parameter_values()));

        let binding = select_repository(&cfg, RetentionMode::Retain);
        assert!(binding.declaration.is_none());
        assert_eq!(binding.handle.name, "legacy");
        assert_eq!(binding.handle.arn, Token::literal(arn));
        assert_eq!(binding.handle.provenance, Provenance::Existing);
    }
}
