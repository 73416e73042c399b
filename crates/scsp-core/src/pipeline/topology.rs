use super::dag::{ActionNode, ActionRole, DagEdge, PipelineDag};
use crate::error::AssemblyError;
use crate::execution::{RUN_ID_VAR, START_TIME_VAR};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

pub const SOURCE_STAGE: &str = "Source";
pub const VALIDATE_STAGE: &str = "validate";
pub const SOURCE_ACTION: &str = "SourceAction";
pub const SOURCE_ARTIFACT: &str = "Artifact_Source";
pub const SOURCE_NAMESPACE: &str = "SourceVariables";

/// One action inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineAction {
    pub name: String,
    pub role: ActionRole,
    pub provider: String,
    pub input_artifacts: Vec<String>,
    pub output_artifacts: Vec<String>,
    pub run_order: u32,
    pub configuration: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
    pub variables_namespace: Option<String>,
}

impl PipelineAction {
    fn category(&self) -> &'static str {
        match self.role {
            ActionRole::Source => "Source",
            ActionRole::Scan | ActionRole::Aggregation => "Test",
        }
    }

    fn declaration(&self) -> Value {
        let mut configuration: serde_json::Map<String, Value> = self
            .configuration
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        if !self.environment.is_empty() {
            let vars: Vec<Value> = self
                .environment
                .iter()
                .map(|(name, value)| json!({ "name": name, "type": "PLAINTEXT", "value": value }))
                .collect();
            configuration.insert(
                "EnvironmentVariables".to_string(),
                json!(Value::Array(vars).to_string()),
            );
        }

        let mut action = json!({
            "Name": self.name,
            "ActionTypeId": {
                "Category": self.category(),
                "Owner": "AWS",
                "Provider": self.provider,
                "Version": "1"
            },
            "Configuration": configuration,
            "RunOrder": self.run_order
        });
        if !self.input_artifacts.is_empty() {
            action["InputArtifacts"] = json!(self
                .input_artifacts
                .iter()
                .map(|a| json!({ "Name": a }))
                .collect::<Vec<_>>());
        }
        if !self.output_artifacts.is_empty() {
            action["OutputArtifacts"] = json!(self
                .output_artifacts
                .iter()
                .map(|a| json!({ "Name": a }))
                .collect::<Vec<_>>());
        }
        if let Some(namespace) = &self.variables_namespace {
            action["Namespace"] = json!(namespace);
        }
        action
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<PipelineAction>,
}

/// The assembled two-stage pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineTopology {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl PipelineTopology {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &PipelineAction> {
        self.stages.iter().flat_map(|s| s.actions.iter())
    }

    pub fn scan_actions(&self) -> impl Iterator<Item = &PipelineAction> {
        self.actions().filter(|a| a.role == ActionRole::Scan)
    }

    pub fn aggregation_action(&self) -> Option<&PipelineAction> {
        self.actions().find(|a| a.role == ActionRole::Aggregation)
    }

    /// Check the structural rules every assembled pipeline must satisfy.
    pub fn validate(&self) -> Result<(), AssemblyError> {
        let missing = |stage: &str| AssemblyError::MissingStage {
            pipeline: self.name.clone(),
            stage: stage.to_string(),
        };
        self.stage(SOURCE_STAGE).ok_or_else(|| missing(SOURCE_STAGE))?;
        let validate = self
            .stage(VALIDATE_STAGE)
            .ok_or_else(|| missing(VALIDATE_STAGE))?;

        let mut seen = HashSet::new();
        for action in self.actions() {
            if !seen.insert(action.name.as_str()) {
                return Err(AssemblyError::DuplicateAction {
                    action: action.name.clone(),
                });
            }
        }

        for action in &validate.actions {
            if !action.input_artifacts.iter().any(|a| a == SOURCE_ARTIFACT) {
                return Err(AssemblyError::DetachedAction {
                    action: action.name.clone(),
                    artifact: SOURCE_ARTIFACT.to_string(),
                });
            }
            if action.run_order != 1 {
                return Err(AssemblyError::Sequenced {
                    action: action.name.clone(),
                    run_order: action.run_order,
                });
            }
            for variable in [RUN_ID_VAR, START_TIME_VAR] {
                if !action.environment.contains_key(variable) {
                    return Err(AssemblyError::Uncorrelated {
                        action: action.name.clone(),
                        variable: variable.to_string(),
                    });
                }
            }
        }

        let aggregations = validate
            .actions
            .iter()
            .filter(|a| a.role == ActionRole::Aggregation)
            .count();
        if aggregations != 1 {
            return Err(AssemblyError::Aggregation {
                stage: VALIDATE_STAGE.to_string(),
                found: aggregations,
            });
        }
        Ok(())
    }

    /// Graph view: every action of stage N+1 depends on all of stage N,
    /// higher runOrder groups depend on lower ones, and the aggregation
    /// action joins every scan through storage.
    pub fn to_dag(&self) -> anyhow::Result<PipelineDag> {
        let mut dag = PipelineDag::new(self.name.clone());
        let mut stage_ids: Vec<Vec<(String, &PipelineAction)>> = Vec::new();

        for stage in &self.stages {
            let mut ids = Vec::new();
            for action in &stage.actions {
                let id = node_id(&stage.name, &action.name);
                if dag.get_action(&id).is_some() {
                    anyhow::bail!(
                        "Action '{}' in stage '{}' collides with another action on DAG id '{}'",
                        action.name,
                        stage.name,
                        id
                    );
                }
                let mut node = ActionNode::new(
                    id.clone(),
                    action.name.clone(),
                    stage.name.clone(),
                    action.role,
                );
                node.provider = action.provider.clone();
                node.run_order = action.run_order;
                dag.add_action(node);
                ids.push((id, action));
            }
            stage_ids.push(ids);
        }

        for ids in &stage_ids {
            for (lower, lower_action) in ids {
                for (current, current_action) in ids {
                    if lower_action.run_order < current_action.run_order {
                        dag.add_edge(lower, current, DagEdge::Dependency)?;
                    }
                }
            }
        }

        for pair in stage_ids.windows(2) {
            for (prev, prev_action) in &pair[0] {
                for (current, current_action) in &pair[1] {
                    let consumes = current_action
                        .input_artifacts
                        .iter()
                        .any(|a| prev_action.output_artifacts.contains(a));
                    let kind = if consumes {
                        DagEdge::Artifact
                    } else {
                        DagEdge::Dependency
                    };
                    dag.add_edge(prev, current, kind)?;
                }
            }
        }

        if let Some(validate) = self.stage(VALIDATE_STAGE) {
            let zip = validate
                .actions
                .iter()
                .find(|a| a.role == ActionRole::Aggregation)
                .map(|a| node_id(VALIDATE_STAGE, &a.name));
            if let Some(zip) = zip {
                for scan in validate.actions.iter().filter(|a| a.role == ActionRole::Scan) {
                    dag.add_edge(&node_id(VALIDATE_STAGE, &scan.name), &zip, DagEdge::Storage)?;
                }
            }
        }

        Ok(dag)
    }

    /// `Stages` array of a pipeline declaration.
    pub fn to_declaration(&self) -> Value {
        Value::Array(
            self.stages
                .iter()
                .map(|stage| {
                    json!({
                        "Name": stage.name,
                        "Actions": stage.actions.iter().map(PipelineAction::declaration).collect::<Vec<_>>()
                    })
                })
                .collect(),
        )
    }
}

/// DAG node id of an action: `<stage>-<action>`, lowercased.
pub fn node_id(stage: &str, action: &str) -> String {
    format!("{}-{}", sanitize_id(stage), sanitize_id(action))
}

fn sanitize_id(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "action".to_string()
    } else {
        trimmed.to_string()
    }
}
