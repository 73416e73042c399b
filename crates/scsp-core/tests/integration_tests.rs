use scsp_core::actions::{registry, BUCKET_PLACEHOLDER};
use scsp_core::aggregate::{aggregate, read_archive, AggregationRequest, AggregationWarning, PollPolicy};
use scsp_core::config::{
    load_parameters, resolve, PipelineConfiguration, RetentionMode, PARAM_EXISTING_REPO,
    PARAM_NEW_REPO, PARAM_RETENTION,
};
use scsp_core::error::{ConfigurationError, TemplateError};
use scsp_core::execution::ExecutionKey;
use scsp_core::graph;
use scsp_core::outcome::Outcome;
use scsp_core::resources::{Provenance, ResourcePlan, RetentionLayout};
use scsp_core::storage::{ArtifactStore, JsonHistoryFile, LocalDirStore};
use scsp_core::template::Template;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Get the workspace root (two levels up from CARGO_MANIFEST_DIR of scsp-core).
fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .parent()
        .unwrap() // crates/
        .parent()
        .unwrap() // workspace root
        .join("tests/fixtures")
}

fn params_fixture(name: &str) -> PathBuf {
    fixtures_dir().join("params").join(name)
}

fn history_fixture(name: &str) -> PathBuf {
    fixtures_dir().join("history").join(name)
}

fn load(name: &str) -> PipelineConfiguration {
    resolve(&load_parameters(&params_fixture(name)).unwrap()).unwrap()
}

fn with_retention(config: &PipelineConfiguration, mode: RetentionMode) -> PipelineConfiguration {
    PipelineConfiguration {
        retention: mode,
        ..config.clone()
    }
}

// ─── Parameter resolution ───

#[test]
fn test_new_repo_fixture_resolves() {
    let config = load("new-repo.toml");
    assert_eq!(config.pipeline_name(), "scsp-repo-main");
    assert_eq!(config.repository_name(), "scsp-repo-123456789012");
    assert_eq!(config.retention, RetentionMode::Retain);
    assert_eq!(config.tools.terraform_paths, vec!["terraform_files", "modules/network"]);
    assert_eq!(config.tools.semgrep_config_arg(), "p/python --config p/secrets");
    assert_eq!(config.tools.tfsec_exclude_flag(), " -e aws-s3-enable-bucket-logging");
    assert_eq!(
        config.tools.jshint_config_json().as_deref(),
        Some(r#"{"esversion":true,"undef":true}"#)
    );
}

#[test]
fn test_existing_repo_fixture_resolves() {
    let config = load("existing-repo.toml");
    assert_eq!(config.pipeline_name(), "scsp-legacy-service-develop");
    assert_eq!(config.repository_name(), "legacy-service");
    assert_eq!(config.tools.sql_dialect.as_str(), "postgres");
}

#[test]
fn test_both_repositories_is_rejected() {
    let raw = load_parameters(&params_fixture("both-repos.toml")).unwrap();
    assert!(matches!(
        resolve(&raw),
        Err(ConfigurationError::BothRepositories { .. })
    ));
}

// ─── Resource selection ───

#[test]
fn test_plan_exposes_one_repository_handle() {
    let created = ResourcePlan::resolve(&load("new-repo.toml")).unwrap();
    assert!(matches!(created.repository.provenance, Provenance::Created { .. }));
    let existing = ResourcePlan::resolve(&load("existing-repo.toml")).unwrap();
    assert_eq!(existing.repository.provenance, Provenance::Existing);

    // The pipeline reads from the handle either way.
    for plan in [&created, &existing] {
        let source = &plan.topology.stages[0].actions[0];
        assert_eq!(source.configuration["RepositoryName"], plan.repository.name);
    }
}

#[test]
fn test_template_pruning_agrees_with_runtime_plan() {
    for fixture in ["new-repo.toml", "existing-repo.toml"] {
        for mode in [RetentionMode::Retain, RetentionMode::Delete] {
            let config = with_retention(&load(fixture), mode);
            let plan = ResourcePlan::resolve(&config).unwrap();
            let template = Template::synthesize(&config, RetentionLayout::Parameterized).unwrap();
            let live = template.live_resources(&config.parameter_values()).unwrap();
            assert_eq!(live, plan.resources, "{fixture} / {mode}");
        }
    }
}

#[test]
fn test_retention_groups_split_the_declaration() {
    let config = load("new-repo.toml");
    let template = Template::synthesize(&config, RetentionLayout::Parameterized).unwrap();
    let declared = template.declaration().resources().count();
    for mode in [RetentionMode::Retain, RetentionMode::Delete] {
        let mut values = config.parameter_values();
        values.insert(PARAM_RETENTION.to_string(), mode.to_string());
        let live = template.live_resources(&values).unwrap();
        assert_eq!(live.len() * 2, declared, "{mode}");
        let ids: HashSet<&str> = live.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), live.len(), "no resource appears twice");
    }

    for value in ["", "RETAIN"] {
        let mut values = config.parameter_values();
        values.insert(PARAM_RETENTION.to_string(), value.to_string());
        assert!(
            matches!(
                template.live_resources(&values),
                Err(TemplateError::DisallowedParameter { .. })
            ),
            "value {value:?}"
        );
    }
}

#[test]
fn test_deploy_values_cannot_change_the_repository() {
    for fixture in ["new-repo.toml", "existing-repo.toml"] {
        let config = load(fixture);
        let template = Template::synthesize(&config, RetentionLayout::Parameterized).unwrap();
        let mut values = config.parameter_values();
        values.insert(PARAM_NEW_REPO.to_string(), String::new());
        values.insert(
            PARAM_EXISTING_REPO.to_string(),
            "arn:aws:codecommit:us-east-1:123456789012:other".to_string(),
        );
        assert!(
            matches!(
                template.live_resources(&values),
                Err(TemplateError::DisallowedParameter { .. })
            ),
            "{fixture}"
        );
    }
}

fn collect_refs<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.push(target);
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = parts.first() {
                    out.push(target);
                }
            }
            for child in map.values() {
                collect_refs(child, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_refs(item, out)),
        _ => {}
    }
}

#[test]
fn test_template_references_resolve() {
    let template = Template::synthesize(&load("new-repo.toml"), RetentionLayout::Parameterized).unwrap();
    let parsed: Value = serde_json::from_str(&template.to_json().unwrap()).unwrap();

    let resources = parsed["Resources"].as_object().unwrap();
    let parameters = parsed["Parameters"].as_object().unwrap();
    let mut refs = Vec::new();
    collect_refs(&parsed["Resources"], &mut refs);
    collect_refs(&parsed["Conditions"], &mut refs);
    collect_refs(&parsed["Outputs"], &mut refs);
    assert!(!refs.is_empty());
    for target in refs {
        assert!(
            resources.contains_key(target)
                || parameters.contains_key(target)
                || target.starts_with("AWS::"),
            "dangling reference {target}"
        );
    }
}

#[test]
fn test_build_specs_reference_the_declared_bucket() {
    let template = Template::synthesize(&load("new-repo.toml"), RetentionLayout::Pinned(RetentionMode::Delete)).unwrap();
    let json = template.to_json().unwrap();
    assert!(!json.contains(BUCKET_PLACEHOLDER));
    assert!(json.contains("PipelineResourcesartifactBucket"));
}

// ─── Scan actions ───

#[test]
fn test_fixture_settings_reach_build_specs() {
    let config = load("new-repo.toml");
    let actions = registry(&config);
    let spec_of = |name: &str| {
        let action = actions.iter().find(|a| a.name == name).unwrap();
        action.build_spec("bucket").commands().map(str::to_string).collect::<Vec<_>>()
    };

    assert!(spec_of("Semgrep")
        .iter()
        .any(|c| c.starts_with("semgrep --config p/python --config p/secrets ") && c.contains("--severity ERROR")));
    assert!(spec_of("Tfsec")
        .iter()
        .any(|c| c.contains(" -e aws-s3-enable-bucket-logging ")));
    assert!(spec_of("JSHint")
        .iter()
        .any(|c| c == r#"echo '{"esversion":true,"undef":true}' > config.json"#));
    let checkov = spec_of("Checkov").join("\n");
    assert!(checkov.contains("terraform_files"));
    assert!(checkov.contains("modules/network"));
}

#[test]
fn test_only_trivy_ignores_findings() {
    let config = load("existing-repo.toml");
    for action in registry(&config) {
        let outcome = action.evaluate([0, 1]);
        if action.name == "Trivy" {
            assert_eq!(outcome, Outcome::Clean);
        } else {
            assert_eq!(outcome, Outcome::Flagged { code: 1 }, "{}", action.name);
        }
    }
}

// ─── Pipeline ───

#[test]
fn test_graph_renders_assembled_pipeline() {
    let plan = ResourcePlan::resolve(&load("new-repo.toml")).unwrap();
    let dag = plan.topology.to_dag().unwrap();
    assert_eq!(dag.max_parallelism(), 14);

    let mermaid = graph::to_mermaid(&dag);
    assert_eq!(mermaid.matches("-.->").count(), 13);
    let dot = graph::to_dot(&dag);
    assert_eq!(dot.matches("[style=dashed]").count(), 13);
}

// ─── Aggregation ───

#[tokio::test]
async fn test_aggregation_against_local_store() {
    let config = load("new-repo.toml");
    let scans = registry(&config);
    let execution = ExecutionKey::new("2024-05-01T10:00:00Z", "exec-1").unwrap();
    let request = AggregationRequest::new(&config, execution.clone(), &scans);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalDirStore::new(dir.path());
    for scan in scans.iter().filter(|s| s.name != "CdkNagForCdk") {
        store
            .put(&execution.log_key(scan.name), format!("{} ran", scan.name).into_bytes())
            .await
            .unwrap();
    }
    let history = JsonHistoryFile::new(history_fixture("list-action-executions.json"));

    let result = aggregate(&store, &history, &request, &PollPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(result.attempts, 8);
    assert_eq!(
        result.warnings,
        vec![AggregationWarning::MissingLogs {
            expected: 13,
            found: 12,
            missing: vec!["CdkNagForCdk".to_string()],
        }]
    );
    assert_eq!(result.actions.len(), 13);
    assert_eq!(result.overall(), Outcome::Flagged { code: 1 });

    let summary = std::fs::read_to_string(
        dir.path()
            .join("scan_results/2024-05-01T10:00:00Z-execution-exec-1/scsp-repo-123456789012-main-summary.txt"),
    )
    .unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 14);
    assert_eq!(lines[0], "Bandit: Succeeded");
    assert!(lines.contains(&"Tfsec: Failed"));
    assert!(!summary.contains("SourceAction"));
    assert!(!summary.contains("zipResults"));
    assert!(lines[13].starts_with("ERROR - Not all tools successfully uploaded scan results."));

    let bundle = store.get(&result.archive_key).await.unwrap();
    let entries = read_archive(&bundle).unwrap();
    assert_eq!(entries.len(), 12);
    assert!(entries.iter().all(|(name, _)| !name.contains('/')));
}
