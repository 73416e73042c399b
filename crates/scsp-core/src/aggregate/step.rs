use super::{PollPolicy, SHORTFALL_MESSAGE};
use crate::actions::{BuildSpec, SCAN_TIMEOUT_MINUTES};
use crate::config::PipelineConfiguration;
use crate::execution::{archive_file_name, summary_file_name, SHELL_PREFIX};
use crate::pipeline::{aggregation_action_name, VALIDATE_STAGE};
use crate::resources::{PolicyStatement, Token};

pub const SUMMARY_ROLE_NAME: &str = "scsp-summary-upload-role";
pub const SUMMARY_POLICY_NAME: &str = "uploadPolicy";
pub const AGGREGATION_TIMEOUT_MINUTES: u32 = SCAN_TIMEOUT_MINUTES + 2;
pub const AGGREGATION_QUEUED_TIMEOUT_MINUTES: u32 = 10;

/// The aggregation action as it runs inside the pipeline: a build project
/// whose commands implement the same poll/bundle/summarize contract as
/// [`super::aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationStep {
    pub name: String,
    pub pipeline: String,
    pub repository: String,
    pub branch: String,
    pub expected_logs: usize,
    pub poll: PollPolicy,
}

impl AggregationStep {
    pub fn new(config: &PipelineConfiguration, expected_logs: usize) -> Self {
        let pipeline = config.pipeline_name();
        Self {
            name: aggregation_action_name(&pipeline),
            pipeline,
            repository: config.repository_name(),
            branch: config.branch.clone(),
            expected_logs,
            poll: PollPolicy::default(),
        }
    }

    pub fn description(&self) -> &'static str {
        "Project that zips the contents of the build folder into a summary zip."
    }

    pub fn build_spec(&self, bucket: &str) -> BuildSpec {
        let expected = self.expected_logs;
        let archive = archive_file_name(&self.repository, &self.branch);
        let summary = summary_file_name(&self.repository, &self.branch);

        let install = vec![
            format!("MAX_TRIES={};", self.poll.max_attempts),
            format!("sleep {};", self.poll.initial_delay.as_secs()),
            [
                "for (( i=1; i<=$MAX_TRIES; i++ )) ; do".to_string(),
                format!("    sleep {};", self.poll.retry_delay.as_secs()),
                format!("    LOG_COUNT=$(aws s3 ls s3://{bucket}/{SHELL_PREFIX}/ | grep .log | wc -l);"),
                "    echo LOG_COUNT is $LOG_COUNT".to_string(),
                format!("    if [[ $LOG_COUNT == {expected} ]]; then"),
                "        break;".to_string(),
                "    fi".to_string(),
                "done".to_string(),
            ]
            .join("\n"),
            [
                format!("if [[ $LOG_COUNT != {expected} ]]; then"),
                format!("    echo \"{SHORTFALL_MESSAGE}\""),
                "fi".to_string(),
            ]
            .join("\n"),
        ];

        let build = vec![
            format!("aws s3 sync s3://{bucket}/{SHELL_PREFIX} . --include \"*.log\" --exclude \"*/*\";"),
            format!("find . -name '*.log' -print0 | tar -czf {archive} --exclude='./*/*' --exclude='./*/' --null --files-from -"),
        ];

        let post_build = vec![
            format!("aws s3api put-object --bucket {bucket} --key {SHELL_PREFIX}/{archive} --body {archive} > /dev/null"),
            format!("SUMMARY={summary}"),
            format!("BUCKET_KEY={SHELL_PREFIX}/$SUMMARY"),
            format!(
                "aws codepipeline list-action-executions --pipeline-name {} --filter pipelineExecutionId=$PIPELINE_RUN_ID | jq -r '.actionExecutionDetails[] | select(.stageName==\"{}\") | select(.actionName!=\"{}\") | .actionName+\": \"+.status' | tee -a $SUMMARY",
                self.pipeline, VALIDATE_STAGE, self.name
            ),
            format!("aws s3api put-object --bucket {bucket} --key $BUCKET_KEY --body $SUMMARY > /dev/null"),
        ];

        BuildSpec::new(install, build, post_build)
    }

    /// Inline policy of the aggregation project's role.
    pub fn role_statements(&self, bucket_arn: &Token) -> Vec<PolicyStatement> {
        let objects = Token::Join(vec![bucket_arn.clone(), Token::literal("/*")]);
        let log_group = format!("log-group:/aws/codebuild/{}", self.name);
        vec![
            PolicyStatement::allow(
                &[
                    "s3:Abort*",
                    "s3:DeleteObject*",
                    "s3:GetBucket*",
                    "s3:GetObject*",
                    "s3:List*",
                    "s3:PutObject",
                    "s3:PutObjectLegalHold",
                    "s3:PutObjectRetention",
                    "s3:PutObjectTagging",
                    "s3:PutObjectVersionTagging",
                ],
                vec![bucket_arn.clone(), objects],
            ),
            PolicyStatement::allow(
                &[
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                ],
                vec![
                    Token::regional_arn("logs", &format!("{}:*", log_group)),
                    Token::regional_arn("logs", &log_group),
                ],
            ),
            PolicyStatement::allow(
                &[
                    "codebuild:BatchPutCodeCoverages",
                    "codebuild:BatchPutTestCases",
                    "codebuild:CreateReport",
                    "codebuild:CreateReportGroup",
                    "codebuild:UpdateReport",
                ],
                vec![Token::regional_arn(
                    "codebuild",
                    &format!("report-group/{}-*", self.name),
                )],
            ),
            PolicyStatement::allow(
                &["codepipeline:ListActionExecutions"],
                vec![Token::regional_arn("codepipeline", &self.pipeline)],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};

    fn step() -> AggregationStep {
        let config = resolve(&RawParameters {
            account_id: "123456789012".to_string(),
            branch_name: "feature/x".to_string(),
            ..Default::default()
        })
        .unwrap();
        AggregationStep::new(&config, 13)
    }

    #[test]
    fn test_poll_loop_matches_policy() {
        let spec = step().build_spec("bucket");
        let install = &spec.phases.install.commands;
        assert_eq!(install[0], "MAX_TRIES=8;");
        assert_eq!(install[1], "sleep 60;");
        assert!(install[2].contains("    sleep 30;"));
        assert!(install[2].contains("if [[ $LOG_COUNT == 13 ]]; then"));
        assert!(install[3].contains("ERROR - Not all tools successfully uploaded scan results."));
    }

    #[test]
    fn test_bundle_and_summary_names() {
        let step = step();
        assert_eq!(step.name, "zipResults-scsp-repo-feature-x");
        let spec = step.build_spec("bucket");
        assert!(spec.phases.build.commands[1].contains("tar -czf scsp-repo-123456789012-feature-x.tar.gz"));
        assert_eq!(
            spec.phases.post_build.commands[1],
            "SUMMARY=scsp-repo-123456789012-feature-x-summary.txt"
        );
        assert!(spec.phases.post_build.commands[3].contains("select(.actionName!=\"zipResults-scsp-repo-feature-x\")"));
    }

    #[test]
    fn test_role_scoped_to_pipeline() {
        let statements = step().role_statements(&Token::arn_of("artifactBucket"));
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0].resources.len(), 2);
        assert_eq!(
            statements[3].resources[0].to_string(),
            "arn:aws:codepipeline:${AWS::Region}:${AWS::AccountId}:scsp-repo-feature-x"
        );
    }
}
