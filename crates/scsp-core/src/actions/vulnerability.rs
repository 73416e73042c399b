use super::buildspec::jq_null_check;
use super::ScanActionDescriptor;

/// Trivy reports vulnerabilities but never fails its action.
pub fn trivy() -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "Trivy",
        "Runs Trivy vulnerability, secret, and config scanner",
    )
    .install([
        "LATEST_RELEASE=$(curl -sL https://api.github.com/repos/aquasecurity/trivy/releases/latest | jq -r \".tag_name\")",
        "curl -sfL https://raw.githubusercontent.com/aquasecurity/trivy/main/contrib/install.sh | sh -s -- -b /usr/local/bin $LATEST_RELEASE",
    ])
    .build([
        "trivy fs --security-checks vuln --severity HIGH,CRITICAL --ignore-unfixed --no-progress --format json --exit-code 0 . > Trivy.log".to_string(),
        "cat Trivy.log".to_string(),
        jq_null_check(
            "Trivy.log",
            ".Results[0].Target",
            "No Vulnerabilities found",
            "Vulnerabilities found",
            false,
        ),
    ])
    .report_only()
}
