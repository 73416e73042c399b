use crate::error::TemplateError;
use crate::execution::{log_file_name, SHELL_PREFIX};
use serde::{Deserialize, Serialize};

/// Stand-in for the artifact bucket name inside rendered commands. Replaced
/// by a reference to the declared bucket when a template is synthesized.
pub const BUCKET_PLACEHOLDER: &str = "@@ARTIFACT_BUCKET@@";

/// Build specification (version 0.2) executed by a managed build project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: f64,
    pub phases: Phases,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    pub install: Phase,
    pub build: Phase,
    pub post_build: Phase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

impl BuildSpec {
    pub fn new(install: Vec<String>, build: Vec<String>, post_build: Vec<String>) -> Self {
        Self {
            version: 0.2,
            phases: Phases {
                install: Phase { commands: install },
                build: Phase { commands: build },
                post_build: Phase {
                    commands: post_build,
                },
            },
        }
    }

    /// Standard layout shared by every scan action.
    ///
    /// Install starts by zeroing `EXITCODE`; post-build runs the pre-report
    /// steps, uploads `<name>.log` under the execution prefix and exits with
    /// the accumulated status.
    pub fn for_scan(
        name: &str,
        install: &[String],
        build: &[String],
        pre_report: &[String],
        bucket: &str,
    ) -> Self {
        let mut install_phase = vec!["EXITCODE=0".to_string()];
        install_phase.extend_from_slice(install);

        let log = log_file_name(name);
        let mut post_build = pre_report.to_vec();
        post_build.push(format!(
            "aws s3api put-object --bucket {bucket} --key {SHELL_PREFIX}/{log} --body {log} > /dev/null"
        ));
        post_build.push(format!(
            "echo \"Log uploaded to {bucket}/{SHELL_PREFIX}/{log}\""
        ));
        post_build.push(
            [
                "if [[ $EXITCODE -eq 0 ]]; then".to_string(),
                format!("    echo \"{name} completed without finding security errors.\""),
                "else".to_string(),
                format!("    echo \"{name} failed due to security errors in repo contents.\""),
                "fi".to_string(),
            ]
            .join("\n"),
        );
        post_build.push("exit $EXITCODE".to_string());

        BuildSpec::new(install_phase, build.to_vec(), post_build)
    }

    /// Every command in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.phases
            .install
            .commands
            .iter()
            .chain(&self.phases.build.commands)
            .chain(&self.phases.post_build.commands)
            .map(String::as_str)
    }

    pub fn to_yaml(&self) -> Result<String, TemplateError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Shell loop over a fixed path list, OR-merging the status of every
/// iteration into `EXITCODE`.
///
/// `body` runs once per path with `$i` bound to the path.
pub(crate) fn for_each_path(array: &str, paths: &[String], body: &[&str]) -> String {
    let mut lines = vec![
        format!("ALL_PATHS={}", paths.join(",")),
        format!("IFS=',' read -ra {array} <<< \"$ALL_PATHS\""),
        format!("for i in \"${{{array}[@]}}\"; do"),
    ];
    lines.extend(body.iter().map(|line| format!("    {}", line)));
    lines.push("done".to_string());
    lines.join("\n")
}

/// `if [ <query> = null ]; then <clean> else <found> [&& EXITCODE=1] fi`
pub(crate) fn jq_null_check(log: &str, query: &str, clean: &str, found: &str, fails: bool) -> String {
    let flag = if fails { " && EXITCODE=1" } else { "" };
    [
        format!("if [ `cat {log} | jq '{query}'` = null ]; then"),
        format!("    echo \"{clean}\""),
        "else".to_string(),
        format!("    echo \"{found}\"{flag}"),
        "fi".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildSpec {
        BuildSpec::for_scan(
            "Bandit",
            &["pip install bandit".to_string()],
            &["python -m bandit -v -r . -o Bandit.log".to_string()],
            &["cat Bandit.log".to_string()],
            "my-bucket",
        )
    }

    #[test]
    fn test_scan_layout() {
        let spec = sample();
        assert_eq!(spec.phases.install.commands[0], "EXITCODE=0");
        assert_eq!(spec.phases.post_build.commands[0], "cat Bandit.log");
        assert_eq!(
            spec.phases.post_build.commands[1],
            "aws s3api put-object --bucket my-bucket --key scan_results/${START_TIME}-execution-$PIPELINE_RUN_ID/Bandit.log --body Bandit.log > /dev/null"
        );
        assert_eq!(spec.commands().last(), Some("exit $EXITCODE"));
    }

    #[test]
    fn test_yaml_rendering() {
        let yaml = sample().to_yaml().unwrap();
        assert!(yaml.starts_with("version: 0.2\n"));
        assert!(yaml.contains("post_build:"));
        let parsed: BuildSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_path_loop_or_merges() {
        let script = for_each_path(
            "TFPATH",
            &["a".to_string(), "b/c".to_string()],
            &["run \"$i\"", "((EXITCODE |= $?))"],
        );
        assert_eq!(
            script,
            "ALL_PATHS=a,b/c\nIFS=',' read -ra TFPATH <<< \"$ALL_PATHS\"\nfor i in \"${TFPATH[@]}\"; do\n    run \"$i\"\n    ((EXITCODE |= $?))\ndone"
        );
    }

    #[test]
    fn test_null_check_only_flags_when_failing() {
        let flagged = jq_null_check("T.log", ".results[0]", "none", "some", true);
        assert!(flagged.contains("echo \"some\" && EXITCODE=1"));
        let report_only = jq_null_check("T.log", ".results[0]", "none", "some", false);
        assert!(!report_only.contains("EXITCODE"));
    }
}
