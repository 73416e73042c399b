use super::buildspec::jq_null_check;
use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn semgrep(tools: &ToolSettings) -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "Semgrep",
        "Static analysis engine for finding bugs, detecting dependency vulnerabilities, and enforcing code standards.",
    )
    .install(["pip install semgrep"])
    .build([
        format!(
            "semgrep --config {} --no-error --enable-nosem --severity {} --quiet --json --output Semgrep.log .",
            tools.semgrep_config_arg(),
            tools.semgrep_severity_arg()
        ),
        "python -m json.tool Semgrep.log".to_string(),
        jq_null_check(
            "Semgrep.log",
            ".results[0].path",
            "No results found",
            "Results found",
            true,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};

    #[test]
    fn test_default_command_line() {
        let tools = resolve(&RawParameters {
            account_id: "123456789012".into(),
            ..Default::default()
        })
        .unwrap()
        .tools;
        assert_eq!(
            semgrep(&tools).build[0],
            "semgrep --config auto --no-error --enable-nosem --severity ERROR --severity WARNING --quiet --json --output Semgrep.log ."
        );
    }
}
