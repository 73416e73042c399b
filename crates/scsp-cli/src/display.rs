use colored::*;
use scsp_core::aggregate::AggregationResult;
use scsp_core::config::{PipelineConfiguration, RepositorySelection};
use scsp_core::outcome::Outcome;
use scsp_core::resources::ResourcePlan;
use scsp_core::storage::ActionStatus;
use scsp_core::template::nag::{NagFinding, NagLevel};
use similar::{ChangeTag, TextDiff};

fn header(title: &str) {
    println!();
    println!(
        "{}",
        format!(" scsp v{} — {}", env!("CARGO_PKG_VERSION"), title).bold()
    );
    println!();
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".dimmed().to_string()
    } else {
        items.join(", ")
    }
}

/// Print a resolved configuration.
pub fn print_configuration(config: &PipelineConfiguration) {
    header("Parameters");

    println!(" {}", "Pipeline".bold().underline());
    println!(" {} Name: {}", "|-".dimmed(), config.pipeline_name().cyan());
    println!(" {} Branch: {}", "|-".dimmed(), config.branch);
    match &config.repository {
        RepositorySelection::New { account_id, .. } => println!(
            " {} Repository: {} (new, account {}, starter {})",
            "|-".dimmed(),
            config.repository_name().cyan(),
            account_id,
            config.starter_bundle.as_str()
        ),
        RepositorySelection::Existing { arn } => println!(
            " {} Repository: {} (existing, {})",
            "|-".dimmed(),
            arn.repository_name().cyan(),
            arn.as_str()
        ),
    }
    println!(" {} Retention: {}", "|-".dimmed(), config.retention);
    println!();

    let tools = &config.tools;
    println!(" {}", "Tools".bold().underline());
    println!(" {} Checkov severity: {}", "|-".dimmed(), tools.checkov_severity);
    println!(" {} Tfsec severity: {}", "|-".dimmed(), tools.tfsec_severity);
    println!(" {} Tfsec excludes: {}", "|-".dimmed(), list_or_dash(&tools.tfsec_exclude));
    println!(" {} CloudFormation paths: {}", "|-".dimmed(), list_or_dash(&tools.cfn_templates_paths));
    println!(" {} Terraform paths: {}", "|-".dimmed(), list_or_dash(&tools.terraform_paths));
    println!(" {} Config rule paths: {}", "|-".dimmed(), list_or_dash(&tools.config_rules_paths));
    println!(" {} SQL dialect: {}", "|-".dimmed(), tools.sql_dialect.as_str());
    println!(" {} Semgrep: --config {} --severity {}", "|-".dimmed(), tools.semgrep_config_arg(), tools.semgrep_severity_arg());
    println!(" {} JSHint excludes: {}", "|-".dimmed(), list_or_dash(&tools.jshint_exclude));
    println!(" {} JSHint options: {}", "|-".dimmed(), list_or_dash(&tools.jshint_options));
    println!();
    println!(" {} Parameters are valid.", "OK".green().bold());
    println!();
}

/// Print the resolved resource plan.
pub fn print_plan(plan: &ResourcePlan) {
    header(&format!("Plan for {}", plan.topology.name));

    println!(" {}", "Repository".bold().underline());
    println!(" {} {} ({})", "|-".dimmed(), plan.repository.name.cyan(), plan.repository.provenance);
    println!(" {} ARN: {}", "|-".dimmed(), plan.repository.arn);
    println!(" {} Retention: {}", "|-".dimmed(), plan.retention);
    println!();

    println!(" {}", "Resources".bold().underline());
    for resource in &plan.resources {
        let removal = resource
            .removal
            .map(|mode| format!(" [{}]", mode).yellow().to_string())
            .unwrap_or_default();
        let name = resource
            .physical_name
            .as_deref()
            .map(|n| format!(" {}", n.dimmed()))
            .unwrap_or_default();
        println!(
            " {} {:<14} {}{}{}",
            "|-".dimmed(),
            resource.label,
            resource.id.bold(),
            name,
            removal
        );
    }
    println!();

    println!(" {}", "Scan actions".bold().underline());
    for scan in &plan.scans {
        let mode = if scan.fails_on_findings {
            "fails on findings".normal()
        } else {
            "report only".yellow()
        };
        println!(
            " {} {:<14} {} ({} min)",
            "|-".dimmed(),
            scan.name,
            mode,
            scan.timeout_minutes
        );
    }
    println!();

    let counts: Vec<String> = plan
        .counts()
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect();
    println!(
        " {} {} resources ({})",
        "Summary:".bold(),
        plan.resources.len(),
        counts.join(", ")
    );
    println!();
}

fn status_label(status: Option<&ActionStatus>) -> ColoredString {
    match status {
        Some(ActionStatus::Succeeded) => "Succeeded".green(),
        Some(ActionStatus::Failed) => "Failed".red().bold(),
        Some(other) => other.as_str().yellow(),
        None => "no record".dimmed(),
    }
}

/// Print an aggregation result.
pub fn print_aggregation(result: &AggregationResult) {
    header(&format!("Aggregation for {}", result.execution));

    for (name, report) in &result.actions {
        let log = match &report.log_location {
            Some(_) => "log".green(),
            None => "no log".red(),
        };
        println!(
            " {} {:<14} {:<12} {}",
            "|-".dimmed(),
            name,
            status_label(report.status.as_ref()),
            log
        );
    }
    println!();

    for warning in &result.warnings {
        println!(" {} {}", "WARN".yellow().bold(), warning);
    }
    if !result.warnings.is_empty() {
        println!();
    }

    println!(" {} {}", "Archive:".bold(), result.archive_key);
    println!(" {} {}", "Summary:".bold(), result.summary_key);
    println!(" {} {} check(s)", "Polled:".bold(), result.attempts);
    let overall = match result.overall() {
        Outcome::Clean => "clean".green().bold(),
        Outcome::Flagged { .. } => "flagged".red().bold(),
    };
    println!(" {} {}", "Overall:".bold(), overall);
    println!();
}

/// Print AwsSolutions findings to stderr so a template on stdout stays clean.
pub fn print_nag_findings(findings: &[NagFinding]) {
    if findings.is_empty() {
        eprintln!(" {} no AwsSolutions findings", "OK".green().bold());
        return;
    }
    for finding in findings {
        let level = match finding.level {
            NagLevel::Error => "ERROR".red().bold(),
            NagLevel::Warning => "WARN".yellow().bold(),
        };
        eprintln!(
            " {} AwsSolutions-{:<5} {} {}",
            level,
            finding.rule,
            finding.resource.cyan(),
            finding.message.dimmed()
        );
    }
}

/// Print a unified diff between two renderings.
pub fn print_diff(original: &str, updated: &str, filename: &str) {
    println!();
    println!("{}", format!(" scsp — Diff against {}", filename).bold());
    println!();

    let diff = TextDiff::from_lines(original, updated);
    let mut has_changes = false;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => {
                has_changes = true;
                print!("{}", format!("- {}", change).red());
            }
            ChangeTag::Insert => {
                has_changes = true;
                print!("{}", format!("+ {}", change).green());
            }
            ChangeTag::Equal => {
                print!("  {}", change);
            }
        }
    }

    if !has_changes {
        println!(" {}", "No changes: the template is up to date.".green());
    }
    println!();
}
