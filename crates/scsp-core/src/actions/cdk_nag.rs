use super::ScanActionDescriptor;

/// Pinned yq release used to parse YAML templates.
pub const YQ_VERSION: &str = "v4.33.3";

const NAG_IFY_URL: &str = "https://proservetools.s3.us-west-2.amazonaws.com/res/cdk-nag-ify.zip";

// Prints one ERROR line per Non-Compliant row of a CDK Nag CSV report.
const NON_COMPLIANT_FILTER: &str = r#"gawk -F, '{ if ($3 ~ /Non-Compliant/) print "ERROR: Found Non-Compliant resource " $2 " violating rule " $1 " with rule info " $6; }'"#;

fn install_commands() -> Vec<String> {
    vec![
        "# install CDK".to_string(),
        "curl --silent -o- https://raw.githubusercontent.com/nvm-sh/nvm/master/install.sh | bash >> /dev/null".to_string(),
        "export NVM_DIR=\"$HOME/.nvm\"".to_string(),
        "[ -s \"$NVM_DIR/nvm.sh\" ] && . \"$NVM_DIR/nvm.sh\"".to_string(),
        "[ -s \"$NVM_DIR/bash_completion\" ] && . \"$NVM_DIR/bash_completion\"".to_string(),
        ". ~/.nvm/nvm.sh".to_string(),
        "npm install aws-cdk-lib --silent".to_string(),
        "npm install -g aws-cdk --silent".to_string(),
        "npm install cdk-nag --silent".to_string(),
        "yum install jq --quiet -y".to_string(),
        format!("YQ_VER={}", YQ_VERSION),
        "YQ_BIN=\"yq_linux_amd64\"".to_string(),
        "wget -q https://github.com/mikefarah/yq/releases/download/${YQ_VER}/${YQ_BIN} -O /usr/bin/yq && chmod +x /usr/bin/yq".to_string(),
    ]
}

pub fn for_cdk() -> ScanActionDescriptor {
    let log = "CdkNagForCdk";
    let synth_projects = [
        "for CDK_PROJECT in $(cat $CDK_PROJECT_NAMES_FILE); do".to_string(),
        "    BASE_NAME=$(basename ${CDK_PROJECT})".to_string(),
        "    if [[ \"$BASE_NAME\" == \"cdk-nag-ify\" ]]; then".to_string(),
        "        continue".to_string(),
        "    fi".to_string(),
        "    cd $CDK_PROJECT".to_string(),
        "    rm -rf cdk.out".to_string(),
        "    if [[ -f \"requirements.txt\" ]]; then".to_string(),
        "        pip install -r requirements.txt".to_string(),
        "    fi".to_string(),
        "    echo \"Starting synth of CDK Project $BASE_NAME\"".to_string(),
        "    cdk synth --quiet".to_string(),
        "    if [[ $? -ne 0 ]]; then".to_string(),
        format!("        echo \"Error when CDK synthesizing project $BASE_NAME\" | tee -a $CWD/{log}.tmp"),
        "        ((EXITCODE |= 1))".to_string(),
        "        cd $CWD".to_string(),
        "        continue".to_string(),
        "    fi".to_string(),
        "    if compgen -G \"${CDK_PROJECT}/cdk.out/AwsSolutions-*NagReport.csv\" >> $NAG_REPORTS_FILE; then".to_string(),
        format!("        echo \"Found a CDK nag report, project $BASE_NAME has CDK Nag Aspects in place\" | tee -a $CWD/{log}.tmp"),
        "    else".to_string(),
        "        for CDK_GENERATED_CFT in ${CDK_PROJECT}/cdk.out/*.template.json; do".to_string(),
        "            cd $CWD/cdk-nag-ify".to_string(),
        "            echo \"No Nag report was found for CDK Project $BASE_NAME; re-synthesizing with CDK Nag added\"".to_string(),
        "            cat $CDK_GENERATED_CFT | jq 'del(.Rules.CheckBootstrapVersion) | del(.Conditions.CDKMetadataAvailable) | del(.Resources.CDKMetadata) | del(.Parameters.BootstrapVersion)' > $CDK_GENERATED_CFT.temp".to_string(),
        "            cdk synth --context cdkNagScanning=on --context cfnTemplateFilename=$CDK_GENERATED_CFT.temp --quiet".to_string(),
        "            if [[ $? -ne 0 ]]; then".to_string(),
        format!("                echo \"Error when synthesizing $BASE_NAME with CDK Nag checks added on\" | tee -a $CWD/{log}.tmp"),
        "                ((EXITCODE |= 1))".to_string(),
        "                if [[ -f \"cdk.out/AwsSolutions-cdkNag-ified-Stack-NagReport.csv\" ]]; then".to_string(),
        format!("                    echo \"$BASE_NAME failed CDK Nag checks and requires review.\" | tee -a $CWD/{log}.tmp"),
        "                else".to_string(),
        format!("                    echo \"Unable to generate CDK Nag report of $BASE_NAME, skipping it and failing this action.\" | tee -a $CWD/{log}.tmp"),
        "                    continue".to_string(),
        "                fi".to_string(),
        "            fi".to_string(),
        "            CDK_NAG_OUTPUT=$(find ~+/cdk.out/AwsSolutions-*NagReport.csv)".to_string(),
        "            if [[ $CDK_NAG_OUTPUT == \"\" ]]; then".to_string(),
        format!("                echo \"Unable to find Nag report for $BASE_NAME; skipping.\" | tee -a $CWD/{log}.tmp"),
        "                continue".to_string(),
        "            fi".to_string(),
        "            RENAMED_OUTPUT=$(echo $CDK_NAG_OUTPUT | sed \"s/.csv/_$BASE_NAME.csv/\")".to_string(),
        "            mv $CDK_NAG_OUTPUT $CDK_PROJECT/$(basename ${RENAMED_OUTPUT})".to_string(),
        "            echo $CDK_PROJECT/$(basename ${RENAMED_OUTPUT}) >> $NAG_REPORTS_FILE".to_string(),
        "            ((EXITCODE |= $?))".to_string(),
        "        done".to_string(),
        "    fi".to_string(),
        "    cd $CWD".to_string(),
        "done".to_string(),
    ]
    .join("\n");

    let review_reports = [
        "if [[ -f $NAG_REPORTS_FILE ]]; then".to_string(),
        "    for NAG_REPORT in $(cat $NAG_REPORTS_FILE); do".to_string(),
        format!("        echo $NAG_REPORT | tee -a {log}.tmp"),
        format!("        cat $NAG_REPORT | tee -a {log}.tmp"),
        format!("        tail -n +2 $NAG_REPORT | {NON_COMPLIANT_FILTER} >> violations.tmp"),
        "        if [[ -s violations.tmp ]]; then".to_string(),
        format!("            cat violations.tmp >> {log}.tmp"),
        "            ((EXITCODE |= 1))".to_string(),
        "        else".to_string(),
        format!("            echo \"No non-compliant findings detected in $NAG_REPORT.\" | tee -a {log}.tmp"),
        "        fi".to_string(),
        "        rm violations.tmp".to_string(),
        "    done".to_string(),
        "else".to_string(),
        format!("    echo \"No CDK Nag reports found.\" | tee -a {log}.tmp"),
        "fi".to_string(),
    ]
    .join("\n");

    ScanActionDescriptor::new(
        "CdkNagForCdk",
        "Runs CDK Nag on CDK projects in the repo. To exclude checks, either include CDK Nag suppressions directly to your project or fix the findings.",
    )
    .install(install_commands())
    .build([
        "CWD=$(pwd)".to_string(),
        "CDK_PROJECT_NAMES_FILE=$CWD/cdk_projects_list.txt".to_string(),
        "touch $CDK_PROJECT_NAMES_FILE".to_string(),
        [
            "find ~+ -type f -name 'cdk.json' -a -not -path '*/node_modules/*' -print0 | while read -d '' -r CDK_JSON_FILE; do",
            "    dirname \"$CDK_JSON_FILE\" >> $CDK_PROJECT_NAMES_FILE",
            "done",
        ]
        .join("\n"),
        "NAG_REPORTS_FILE=$CWD/nag_reports_list.txt".to_string(),
        format!("curl -s {NAG_IFY_URL} -o $CWD/cdk-nag-ify.zip"),
        "unzip -n $CWD/cdk-nag-ify.zip".to_string(),
        synth_projects,
        format!("touch {log}.tmp"),
        review_reports,
        format!("mv {log}.tmp {log}.log"),
    ])
}

pub fn for_cfts() -> ScanActionDescriptor {
    let log = "CdkNagForCfts";
    let find_templates = [
        "find ~+ -type f \\( -name '*.json' -o -name '*.yaml' -o -name '*.yml' \\) -a -not -path '*/node_modules/*' -a -not -path '*/cdk.out/*' -print0 | while read -d '' -r CFTFILE; do",
        "    QUERY_COMMAND=\"yq\"",
        "    if [[ $CFTFILE =~ .json$ ]]; then",
        "        QUERY_COMMAND=\"jq\"",
        "    fi",
        "    CONTENTS=$(cat \"$CFTFILE\" | $QUERY_COMMAND 'select(.Resources != null)' 2> /dev/null)",
        "    if [[ $? && $CONTENTS ]]; then",
        "        echo $CFTFILE >> $CFT_NAMES_FILE",
        "    fi",
        "done",
    ]
    .join("\n");

    let scan_templates = [
        "if [[ ! -f $CFT_NAMES_FILE ]]; then".to_string(),
        format!("    echo \"No CFTs found in repo.\" | tee -a $CWD/{log}.log"),
        "else".to_string(),
        format!("    curl -s {NAG_IFY_URL} -o $CWD/cdk-nag-ify.zip"),
        "    unzip -n $CWD/cdk-nag-ify.zip".to_string(),
        "    cd cdk-nag-ify".to_string(),
        format!("    touch $CWD/{log}.tmp"),
        "    for CFT in $(cat $CFT_NAMES_FILE); do".to_string(),
        format!("        echo $CFT | tee -a $CWD/{log}.tmp"),
        "        cdk synth --quiet --context cdkNagScanning=on --context cfnTemplateFilename=$CFT".to_string(),
        "        ((EXITCODE |= $?))".to_string(),
        "        NAG_REPORT=$(find ~+/cdk.out/AwsSolutions*.csv)".to_string(),
        format!("        tail -n +2 $NAG_REPORT | {NON_COMPLIANT_FILTER} >> violations.tmp"),
        "        if [[ -s violations.tmp ]]; then".to_string(),
        format!("            cat violations.tmp >> $CWD/{log}.tmp"),
        "            ((EXITCODE |= 1))".to_string(),
        "        else".to_string(),
        format!("            echo \"No non-compliant findings detected in $NAG_REPORT.\" | tee -a $CWD/{log}.tmp"),
        "        fi".to_string(),
        "        rm violations.tmp".to_string(),
        "    done".to_string(),
        format!("    mv $CWD/{log}.tmp $CWD/{log}.log"),
        "fi".to_string(),
    ]
    .join("\n");

    ScanActionDescriptor::new(
        "CdkNagForCfts",
        "Runs CDK Nag on CFTs in the repo. Exclusions can be added using the 'CloudFormation template with granular suppressions' instructions from https://github.com/cdklabs/cdk-nag",
    )
    .install(install_commands())
    .build([
        "CWD=$(pwd)".to_string(),
        "CFT_NAMES_FILE=$CWD/cft_list.txt".to_string(),
        find_templates,
        scan_templates,
        "cd $CWD".to_string(),
    ])
}
