use super::buildspec::for_each_path;
use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn rdk_unit_test(tools: &ToolSettings) -> ScanActionDescriptor {
    ScanActionDescriptor::new(
        "RdkUnitTest",
        "Runs unit tests for the Config rules within the Config Rules folder",
    )
    .install(["pip install rdk", "pip install rdklib"])
    .build([
        "cwd=$(pwd)".to_string(),
        for_each_path(
            "RDKPATH",
            &tools.config_rules_paths,
            &[
                "cd $i",
                "if [ $(find -L . -mindepth 1 -maxdepth 1 -type d | wc -l) -gt 0 ]; then",
                "    echo Unit testing RDK rules in directory $i | tee -a $cwd/RdkUnitTest.tmp",
                "    OUTPUT=$(rdk test-local --all)",
                "    ((EXITCODE |= $?))",
                "    echo \"$OUTPUT\" | tee -a $cwd/RdkUnitTest.tmp",
                "else",
                "    echo \"No rule directories found\" | tee -a $cwd/RdkUnitTest.tmp",
                "fi",
                "cd $cwd",
            ],
        ),
        "echo End of RDK unit testing | tee -a RdkUnitTest.tmp".to_string(),
        "mv RdkUnitTest.tmp RdkUnitTest.log".to_string(),
    ])
}
