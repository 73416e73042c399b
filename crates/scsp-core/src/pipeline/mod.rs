//! Pipeline assembly: source checkout, the scan fan-out and the terminal
//! aggregation action, composed into one two-stage topology.

pub mod dag;
pub mod topology;

pub use dag::{ActionNode, ActionRole, DagEdge, PipelineDag};
pub use topology::{
    node_id, PipelineAction, PipelineTopology, Stage, SOURCE_ACTION, SOURCE_ARTIFACT,
    SOURCE_NAMESPACE, SOURCE_STAGE, VALIDATE_STAGE,
};

use crate::actions::ScanActionDescriptor;
use crate::config::PipelineConfiguration;
use crate::error::AssemblyError;
use crate::execution::{RUN_ID_SOURCE, RUN_ID_VAR, START_TIME_SOURCE, START_TIME_VAR};
use crate::resources::RepositoryHandle;
use std::collections::BTreeMap;
use tracing::info;

pub const AGGREGATION_ACTION_PREFIX: &str = "zipResults";

/// `zipResults-<pipeline>`; also the aggregation project's name.
pub fn aggregation_action_name(pipeline: &str) -> String {
    format!("{}-{}", AGGREGATION_ACTION_PREFIX, pipeline)
}

/// Environment every validate action receives so outputs of one run share
/// a storage prefix.
fn correlation_environment() -> BTreeMap<String, String> {
    BTreeMap::from([
        (RUN_ID_VAR.to_string(), RUN_ID_SOURCE.to_string()),
        (START_TIME_VAR.to_string(), START_TIME_SOURCE.to_string()),
    ])
}

fn build_action(name: String, project: String, role: ActionRole) -> PipelineAction {
    PipelineAction {
        name,
        role,
        provider: "CodeBuild".to_string(),
        input_artifacts: vec![SOURCE_ARTIFACT.to_string()],
        output_artifacts: Vec::new(),
        // Every validate action shares runOrder 1: a failed scan must not
        // block the aggregation from running.
        run_order: 1,
        configuration: BTreeMap::from([("ProjectName".to_string(), project)]),
        environment: correlation_environment(),
        variables_namespace: None,
    }
}

/// Compose the pipeline for `config`.
pub fn assemble(
    config: &PipelineConfiguration,
    repository: &RepositoryHandle,
    scans: &[ScanActionDescriptor],
) -> Result<PipelineTopology, AssemblyError> {
    let name = config.pipeline_name();

    let source = PipelineAction {
        name: SOURCE_ACTION.to_string(),
        role: ActionRole::Source,
        provider: "CodeCommit".to_string(),
        input_artifacts: Vec::new(),
        output_artifacts: vec![SOURCE_ARTIFACT.to_string()],
        run_order: 1,
        configuration: BTreeMap::from([
            ("RepositoryName".to_string(), repository.name.clone()),
            ("BranchName".to_string(), config.branch.clone()),
            ("PollForSourceChanges".to_string(), "false".to_string()),
        ]),
        environment: BTreeMap::new(),
        variables_namespace: Some(SOURCE_NAMESPACE.to_string()),
    };

    let mut validate: Vec<PipelineAction> = scans
        .iter()
        .map(|scan| {
            build_action(
                scan.name.to_string(),
                scan.project_name(&name),
                ActionRole::Scan,
            )
        })
        .collect();
    let aggregation = aggregation_action_name(&name);
    validate.push(build_action(
        aggregation.clone(),
        aggregation,
        ActionRole::Aggregation,
    ));

    let topology = PipelineTopology {
        name,
        stages: vec![
            Stage {
                name: SOURCE_STAGE.to_string(),
                actions: vec![source],
            },
            Stage {
                name: VALIDATE_STAGE.to_string(),
                actions: validate,
            },
        ],
    };
    topology.validate()?;
    info!(
        pipeline = %topology.name,
        scans = scans.len(),
        "assembled pipeline"
    );
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::registry;
    use crate::config::{resolve, RawParameters, RetentionMode};
    use crate::resources::select_repository;

    fn topology() -> PipelineTopology {
        let config = resolve(&RawParameters {
            account_id: "123456789012".to_string(),
            ..Default::default()
        })
        .unwrap();
        let repo = select_repository(&config, RetentionMode::Delete).handle;
        assemble(&config, &repo, &registry(&config)).unwrap()
    }

    #[test]
    fn test_two_stages_with_fan_out() {
        let topo = topology();
        assert_eq!(topo.name, "scsp-repo-main");
        assert_eq!(topo.stages.len(), 2);
        assert_eq!(topo.stage(SOURCE_STAGE).unwrap().actions.len(), 1);
        assert_eq!(topo.stage(VALIDATE_STAGE).unwrap().actions.len(), 14);
        assert_eq!(topo.scan_actions().count(), 13);
        assert_eq!(
            topo.aggregation_action().unwrap().name,
            "zipResults-scsp-repo-main"
        );
    }

    #[test]
    fn test_validate_actions_share_source_and_correlation() {
        let topo = topology();
        for action in &topo.stage(VALIDATE_STAGE).unwrap().actions {
            assert_eq!(action.input_artifacts, vec![SOURCE_ARTIFACT]);
            assert_eq!(action.run_order, 1);
            assert_eq!(action.environment[RUN_ID_VAR], "#{codepipeline.PipelineExecutionId}");
            assert_eq!(action.environment[START_TIME_VAR], "#{SourceVariables.CommitterDate}");
        }
        let source = &topo.stage(SOURCE_STAGE).unwrap().actions[0];
        assert_eq!(source.configuration["RepositoryName"], "scsp-repo-123456789012");
        assert_eq!(source.variables_namespace.as_deref(), Some(SOURCE_NAMESPACE));
    }

    #[test]
    fn test_validation_rejects_sequenced_aggregation() {
        let mut topo = topology();
        let validate = topo.stages.iter_mut().find(|s| s.name == VALIDATE_STAGE).unwrap();
        validate.actions.last_mut().unwrap().run_order = 2;
        assert!(matches!(
            topo.validate(),
            Err(AssemblyError::Sequenced { run_order: 2, .. })
        ));
    }

    #[test]
    fn test_validation_rejects_detached_and_uncorrelated_actions() {
        let mut detached = topology();
        detached.stages[1].actions[0].input_artifacts.clear();
        assert!(matches!(
            detached.validate(),
            Err(AssemblyError::DetachedAction { .. })
        ));

        let mut uncorrelated = topology();
        uncorrelated.stages[1].actions[3].environment.remove(START_TIME_VAR);
        assert!(matches!(
            uncorrelated.validate(),
            Err(AssemblyError::Uncorrelated { .. })
        ));
    }

    #[test]
    fn test_validation_requires_single_aggregation() {
        let mut topo = topology();
        topo.stages[1].actions.pop();
        assert_eq!(
            topo.validate(),
            Err(AssemblyError::Aggregation {
                stage: VALIDATE_STAGE.to_string(),
                found: 0
            })
        );
    }

    #[test]
    fn test_dag_shape() {
        let dag = topology().to_dag().unwrap();
        assert_eq!(dag.action_count(), 15);
        assert_eq!(dag.root_actions().len(), 1);
        assert_eq!(dag.max_parallelism(), 14);

        let zip = node_id(VALIDATE_STAGE, "zipResults-scsp-repo-main");
        let bandit = node_id(VALIDATE_STAGE, "Bandit");
        let source = node_id(SOURCE_STAGE, SOURCE_ACTION);
        assert!(dag.has_edge(&source, &bandit, DagEdge::Artifact));
        assert!(dag.has_edge(&bandit, &zip, DagEdge::Storage));
        assert_eq!(dag.get_action(&zip).unwrap().needs, vec![source]);
    }

    #[test]
    fn test_dag_rejects_colliding_action_ids() {
        let mut topo = topology();
        let mut twin = topo.stages[1].actions[0].clone();
        twin.name = "bandit".to_string();
        topo.stages[1].actions.push(twin);
        let err = topo.to_dag().unwrap_err();
        assert!(err.to_string().contains("validate-bandit"));
    }

    #[test]
    fn test_declaration_shape() {
        let stages = topology().to_declaration();
        assert_eq!(stages[0]["Name"], "Source");
        assert_eq!(stages[0]["Actions"][0]["Namespace"], "SourceVariables");
        let bandit = &stages[1]["Actions"][0];
        assert_eq!(bandit["ActionTypeId"]["Category"], "Test");
        assert_eq!(bandit["Configuration"]["ProjectName"], "Bandit-scsp-repo-main");
        let env: serde_json::Value =
            serde_json::from_str(bandit["Configuration"]["EnvironmentVariables"].as_str().unwrap())
                .unwrap();
        assert_eq!(env[0]["name"], "PIPELINE_RUN_ID");
        assert_eq!(env[1]["value"], "#{SourceVariables.CommitterDate}");
    }
}
