//! Conditional resource model.
//!
//! Resources live in a tree of groups; each leaf may carry a condition over
//! deploy-time parameters. [`declare`] builds the tree for a configuration,
//! either with the retention choice left open (two complementary groups)
//! or pinned. [`ResourcePlan::resolve`] is the runtime path: one live set.

pub mod condition;
pub mod kind;
pub mod plan;
pub mod repository;
pub mod tree;

pub use condition::{Condition, ConditionPair, NamedCondition, ParameterValues};
pub use kind::{removal_policy, BuildProjectSpec, PolicyStatement, ResourceKind, Token};
pub use plan::{
    declare, retention_pair, Declaration, PlannedResource, ResourcePlan, RetentionLayout,
    ARTIFACT_BUCKET, DELETE_CONDITION, DELETE_GROUP, PINNED_GROUP, PIPELINE_RESOURCE,
    RETAIN_CONDITION, RETAIN_GROUP,
};
pub use repository::{
    create_new_repo, new_repo_exists, select_repository, Provenance, RepositoryBinding,
    RepositoryHandle,
};
pub use tree::{ConditionalResource, FlatResource, ResourceNode};
