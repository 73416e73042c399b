use super::ScanActionDescriptor;
use crate::config::ToolSettings;

pub fn jshint(tools: &ToolSettings) -> ScanActionDescriptor {
    let mut build = Vec::new();
    if let Some(json) = tools.jshint_config_json() {
        build.push(format!("echo '{}' > config.json", json));
    }
    build.push(format!(
        "jshint{} .{} > JSHint.log 2>&1 || true",
        tools.jshint_config_flag(),
        tools.jshint_exclude_flag()
    ));
    build.push(
        [
            "if [ -s JSHint.log ]; then",
            "    echo \"Errors and potential problems spotted in JavaScript code.\" && EXITCODE=1",
            "else",
            "    echo \"No errors and potential problems spotted in JavaScript code.\"",
            "fi",
        ]
        .join("\n"),
    );

    ScanActionDescriptor::new(
        "JSHint",
        "Runs JSHint, a community-driven tool that detects errors and potential problems in JavaScript code.",
    )
    .install(["npm install -g jshint"])
    .build(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawParameters};

    fn tools(exclude: &str, options: &str) -> ToolSettings {
        resolve(&RawParameters {
            account_id: "123456789012".into(),
            jshint_exclude_list: exclude.into(),
            jshint_config_list: options.into(),
            ..Default::default()
        })
        .unwrap()
        .tools
    }

    #[test]
    fn test_defaults_use_no_config_file() {
        let action = jshint(&tools("", ""));
        assert_eq!(action.build[0], "jshint . > JSHint.log 2>&1 || true");
        assert!(!action.build.iter().any(|c| c.contains("config.json")));
    }

    #[test]
    fn test_options_write_config_file() {
        let action = jshint(&tools("node_modules,dist", "esversion"));
        assert_eq!(action.build[0], "echo '{\"esversion\":true}' > config.json");
        assert_eq!(
            action.build[1],
            "jshint --config ./config.json . --exclude node_modules,dist > JSHint.log 2>&1 || true"
        );
    }
}
