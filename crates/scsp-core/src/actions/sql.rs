use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn sqlfluff(tools: &ToolSettings) -> ScanActionDescriptor {
    // The while-read loop runs in a subshell, so failures are recorded in a
    // marker file rather than in EXITCODE.
    let lint = [
        "find . -type f -name \"*.sql\" -print0 | while read -d '' -r SQLSCRIPT; do".to_string(),
        format!(
            "    OUTPUT=$(sqlfluff lint $SQLSCRIPT --dialect {} --exclude-rules L016)",
            tools.sql_dialect.as_str()
        ),
        "    if (( $? )) ; then".to_string(),
        "        touch sqlflufferror.inf".to_string(),
        "    fi".to_string(),
        "    echo \"$OUTPUT\" | tee -a SqlFluff.tmp".to_string(),
        "done".to_string(),
    ]
    .join("\n");

    ScanActionDescriptor::new("SqlFluff", "Runs linting on .sql files")
        .install(["pip install sqlfluff"])
        .build([
            lint,
            "echo \"If you have many errors to fix then consider using the command 'sqlfluff fix' to autofix certain problems\" | tee -a SqlFluff.tmp".to_string(),
            [
                "if [[ -e sqlflufferror.inf ]] ; then",
                "    ((EXITCODE |= 1))",
                "fi",
            ]
            .join("\n"),
            "mv SqlFluff.tmp SqlFluff.log".to_string(),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};

    #[test]
    fn test_dialect_is_passed_through() {
        let tools = resolve(&RawParameters {
            account_id: "123456789012".into(),
            sql_dialect: "snowflake".into(),
            ..Default::default()
        })
        .unwrap()
        .tools;
        let action = sqlfluff(&tools);
        assert!(action.build[0].contains("--dialect snowflake --exclude-rules L016"));
    }
}
