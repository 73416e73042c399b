use super::buildspec::{for_each_path, jq_null_check};
use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn checkov(tools: &ToolSettings) -> ScanActionDescriptor {
    let severity = tools.checkov_severity.as_str();
    let scan = format!("OUTPUT=$(checkov --hard-fail-on {severity} --directory \"$i\")");
    let quiet = format!("    OUTPUT=$(checkov --quiet --hard-fail-on {severity} --directory \"$i\")");
    ScanActionDescriptor::new(
        "Checkov",
        "Runs the Checkov linter on all Terraform files in the specified subfolder",
    )
    .install(["pip install checkov"])
    .build([
        for_each_path(
            "TFPATH",
            &tools.terraform_paths,
            &[
                "echo Scanning Terraform Code in $i using Checkov | tee -a Checkov.tmp",
                scan.as_str(),
                "((EXITCODE |= $?))",
                "echo \"$OUTPUT\" | tee -a Checkov.tmp",
                // tee fails on very long output; retry in quiet mode
                "if (( $? )); then",
                quiet.as_str(),
                "    ((EXITCODE |= $?))",
                "    echo \"$OUTPUT\" | tee -a Checkov.tmp",
                "fi",
            ],
        ),
        "touch Checkov.tmp".to_string(),
        "mv Checkov.tmp Checkov.log".to_string(),
    ])
}

pub fn tfsec(tools: &ToolSettings) -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "Tfsec",
        "Runs Tfsec, a static analysis security scanner for Terraform code.",
    )
    .install([
        "LATEST_RELEASE=$(curl -sL https://api.github.com/repos/aquasecurity/tfsec/releases/latest | jq -r \".tag_name\")",
        "curl -s https://raw.githubusercontent.com/aquasecurity/tfsec/master/scripts/install_linux.sh | bash",
    ])
    .build([
        format!(
            "tfsec -f json -m {}{} -s -O Tfsec.log .",
            tools.tfsec_severity.as_str(),
            tools.tfsec_exclude_flag()
        ),
        "cat Tfsec.log".to_string(),
        jq_null_check(
            "Tfsec.log",
            ".results[0].severity",
            "No misconfigurations spotted.",
            "Misconfigurations spotted.",
            true,
        ),
    ])
}
