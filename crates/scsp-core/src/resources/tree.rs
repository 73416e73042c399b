use super::condition::{NamedCondition, ParameterValues};
use super::kind::ResourceKind;
use crate::config::RetentionMode;

/// A resource declaration, optionally gated by a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalResource {
    pub id: String,
    pub kind: ResourceKind,
    pub condition: Option<NamedCondition>,
    /// Teardown behaviour for resources that hold data.
    pub removal: Option<RetentionMode>,
    /// Ids (relative to the top-level group) that must exist first.
    pub depends_on: Vec<String>,
}

impl ConditionalResource {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            condition: None,
            removal: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_removal(mut self, mode: RetentionMode) -> Self {
        self.removal = Some(mode);
        self
    }

    pub fn with_condition(mut self, condition: NamedCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn depending_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = ids;
        self
    }

    /// Gate this resource on `condition`, keeping any condition it already has.
    pub fn add_condition(&mut self, condition: &NamedCondition) {
        self.condition = Some(match self.condition.take() {
            Some(existing) => condition.and(&existing),
            None => condition.clone(),
        });
    }

    pub fn is_live(&self, values: &ParameterValues) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |condition| condition.evaluate(values))
    }
}

/// Resource declaration tree. Groups only contribute an id prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNode {
    Group {
        id: String,
        children: Vec<ResourceNode>,
    },
    Resource(Box<ConditionalResource>),
}

/// A resource leaf with its fully prefixed logical id.
#[derive(Debug, Clone)]
pub struct FlatResource<'a> {
    /// Top-level group id; references inside the resource are relative to it.
    pub scope: &'a str,
    pub resource: &'a ConditionalResource,
    /// Ids of the nested groups between the top-level group and the leaf.
    prefix: String,
}

impl FlatResource<'_> {
    /// Id relative to the top-level group.
    pub fn local_id(&self) -> String {
        format!("{}{}", self.prefix, self.resource.id)
    }

    pub fn logical_id(&self) -> String {
        format!("{}{}", self.scope, self.local_id())
    }
}

impl ResourceNode {
    pub fn group(id: impl Into<String>, children: Vec<ResourceNode>) -> Self {
        ResourceNode::Group {
            id: id.into(),
            children,
        }
    }

    pub fn resource(resource: ConditionalResource) -> Self {
        ResourceNode::Resource(Box::new(resource))
    }

    pub fn id(&self) -> &str {
        match self {
            ResourceNode::Group { id, .. } => id,
            ResourceNode::Resource(resource) => &resource.id,
        }
    }

    /// Apply `condition` to every resource in this subtree.
    ///
    /// A resource that is already conditioned ends up with the conjunction
    /// of the new and the existing condition.
    pub fn apply_condition(&mut self, condition: &NamedCondition) {
        match self {
            ResourceNode::Group { children, .. } => {
                for child in children {
                    child.apply_condition(condition);
                }
            }
            ResourceNode::Resource(resource) => resource.add_condition(condition),
        }
    }

    pub fn resource_count(&self) -> usize {
        match self {
            ResourceNode::Group { children, .. } => {
                children.iter().map(ResourceNode::resource_count).sum()
            }
            ResourceNode::Resource(_) => 1,
        }
    }

    /// Every resource leaf, depth first, in declaration order. The node's
    /// own id (when it is a group) becomes the scope of all leaves.
    pub fn flatten(&self) -> Vec<FlatResource<'_>> {
        let mut out = Vec::new();
        match self {
            ResourceNode::Group { id, children } => {
                for child in children {
                    child.collect(id, String::new(), &mut out);
                }
            }
            ResourceNode::Resource(resource) => out.push(FlatResource {
                scope: "",
                resource,
                prefix: String::new(),
            }),
        }
        out
    }

    fn collect<'a>(&'a self, scope: &'a str, prefix: String, out: &mut Vec<FlatResource<'a>>) {
        match self {
            ResourceNode::Group { id, children } => {
                let nested = format!("{}{}", prefix, id);
                for child in children {
                    child.collect(scope, nested.clone(), out);
                }
            }
            ResourceNode::Resource(resource) => out.push(FlatResource {
                scope,
                resource,
                prefix,
            }),
        }
    }
}
