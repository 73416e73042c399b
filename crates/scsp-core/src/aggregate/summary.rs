use super::AggregationWarning;
use crate::pipeline::VALIDATE_STAGE;
use crate::storage::ActionExecution;

/// History records that belong in the summary: validate-stage actions other
/// than the aggregation action itself.
pub fn summary_records<'a>(
    records: &'a [ActionExecution],
    aggregation_action: &'a str,
) -> impl Iterator<Item = &'a ActionExecution> {
    records
        .iter()
        .filter(move |r| r.stage_name == VALIDATE_STAGE && r.action_name != aggregation_action)
}

/// Plain-text summary: one `<action>: <status>` line per record, then one
/// line per warning.
pub fn render_summary<'a, I>(records: I, warnings: &[AggregationWarning]) -> String
where
    I: IntoIterator<Item = &'a ActionExecution>,
{
    let mut out = String::new();
    for record in records {
        out.push_str(&format!("{}: {}\n", record.action_name, record.status));
    }
    for warning in warnings {
        out.push_str(&format!("{}\n", warning));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ActionStatus;

    fn record(stage: &str, action: &str, status: ActionStatus) -> ActionExecution {
        ActionExecution {
            pipeline_execution_id: "e".to_string(),
            stage_name: stage.to_string(),
            action_name: action.to_string(),
            status,
        }
    }

    #[test]
    fn test_summary_skips_source_and_self() {
        let records = vec![
            record("Source", "SourceAction", ActionStatus::Succeeded),
            record("validate", "Bandit", ActionStatus::Succeeded),
            record("validate", "Tfsec", ActionStatus::Failed),
            record("validate", "zipResults-p", ActionStatus::InProgress),
        ];
        let text = render_summary(summary_records(&records, "zipResults-p"), &[]);
        assert_eq!(text, "Bandit: Succeeded\nTfsec: Failed\n");
    }

    #[test]
    fn test_summary_appends_shortfall() {
        let warning = AggregationWarning::MissingLogs {
            expected: 2,
            found: 1,
            missing: vec!["Trivy".to_string()],
        };
        let text = render_summary(std::iter::empty(), &[warning]);
        assert!(text.starts_with("ERROR - Not all tools successfully uploaded scan results."));
    }
}
