use super::buildspec::for_each_path;
use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn cfn_nag(tools: &ToolSettings) -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "CfnNag",
        "Runs cfn_nag on CloudFormation templates in the repository",
    )
    .install(["gem install cfn-nag"])
    .build([
        for_each_path(
            "CFNPATH",
            &tools.cfn_templates_paths,
            &[
                "echo Scanning CloudFormation Templates in $i | tee -a CfnNag.tmp",
                "OUTPUT=$(cfn_nag_scan --input-path \"$i\")",
                "((EXITCODE |= $?))",
                "echo \"$OUTPUT\" | tee -a CfnNag.tmp",
            ],
        ),
        "mv CfnNag.tmp CfnNag.log".to_string(),
    ])
}
