mod display;
mod logging;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use scsp_core::actions::{self, BUCKET_PLACEHOLDER};
use scsp_core::aggregate::{aggregate, AggregationRequest, AggregationStep, PollPolicy};
use scsp_core::config::{
    generate_default_parameters, load_parameters, parse_override, resolve, PipelineConfiguration,
    RawParameters,
};
use scsp_core::execution::ExecutionKey;
use scsp_core::graph;
use scsp_core::pipeline::AGGREGATION_ACTION_PREFIX;
use scsp_core::resources::{ResourcePlan, RetentionLayout};
use scsp_core::storage::{JsonHistoryFile, LocalDirStore};
use scsp_core::template::{nag, Template};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_PARAMS_FILE: &str = "scsp.toml";

#[derive(Parser)]
#[command(
    name = "scsp",
    version,
    about = "Simple Code Scanning Pipeline: declare, inspect and aggregate security scans",
    long_about = "Resolve pipeline parameters, synthesize the conditional resource template for a \
                  security scanning pipeline, render each scan action's build spec, and aggregate \
                  scan logs of a pipeline run into an archive and summary."
)]
struct Cli {
    /// Parameters file (defaults to ./scsp.toml when present)
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    /// Override one parameter; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TemplateFormat {
    Json,
    Yaml,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Dot,
    Ascii,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default parameters file
    Init {
        /// Where to write the file
        #[arg(short, long, default_value = DEFAULT_PARAMS_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Resolve and validate parameters
    Validate {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the repository, live resources and scan actions for the current parameters
    Plan {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Render the declarative template
    Synth {
        #[arg(short, long, value_enum, default_value_t = TemplateFormat::Json)]
        format: TemplateFormat,

        /// Declare only the configured retention policy instead of both variants
        #[arg(long)]
        pin_retention: bool,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show a diff against a previously rendered template
        #[arg(long, value_name = "FILE")]
        diff: Option<PathBuf>,

        /// Check the template against AwsSolutions rules; fail on any error-level finding
        #[arg(long)]
        nag_checks: bool,
    },

    /// Print the build spec of one action
    Buildspec {
        /// Scan action name (case-insensitive), or `zipResults` for the aggregation step
        action: String,

        /// Artifact bucket name to substitute
        #[arg(long, default_value = BUCKET_PLACEHOLDER)]
        bucket: String,
    },

    /// Visualize the pipeline topology
    Graph {
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },

    /// Aggregate scan logs of one execution from a local store
    Aggregate {
        /// Directory mirroring the artifact bucket
        #[arg(long)]
        store: PathBuf,

        /// `list-action-executions` JSON output for the pipeline
        #[arg(long)]
        history: PathBuf,

        /// Source commit time of the execution
        #[arg(long)]
        start_time: String,

        /// Pipeline execution id
        #[arg(long)]
        execution_id: String,

        /// Poll without sleeping
        #[arg(long)]
        no_wait: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(
        cli.log_format == LogFormat::Json,
        logging::level_from_verbosity(cli.verbose),
    );

    match &cli.command {
        Commands::Init { output, force } => cmd_init(output, *force),
        Commands::Validate { format } => cmd_validate(&cli, *format),
        Commands::Plan { format } => cmd_plan(&cli, *format),
        Commands::Synth {
            format,
            pin_retention,
            output,
            diff,
            nag_checks,
        } => cmd_synth(
            &cli,
            *format,
            *pin_retention,
            output.as_deref(),
            diff.as_deref(),
            *nag_checks,
        ),
        Commands::Buildspec { action, bucket } => cmd_buildspec(&cli, action, bucket),
        Commands::Graph { format } => cmd_graph(&cli, *format),
        Commands::Aggregate {
            store,
            history,
            start_time,
            execution_id,
            no_wait,
            format,
        } => cmd_aggregate(
            &cli,
            store,
            history,
            start_time,
            execution_id,
            *no_wait,
            *format,
        ),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "scsp", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn raw_parameters(cli: &Cli) -> Result<RawParameters> {
    let raw = match &cli.params {
        Some(path) => load_parameters(path)?,
        None if Path::new(DEFAULT_PARAMS_FILE).is_file() => {
            load_parameters(Path::new(DEFAULT_PARAMS_FILE))?
        }
        None => {
            debug!("no parameters file, using defaults");
            RawParameters::default()
        }
    };
    let overrides = cli
        .overrides
        .iter()
        .map(|arg| parse_override(arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(raw.with_overrides(overrides)?)
}

fn configuration(cli: &Cli) -> Result<PipelineConfiguration> {
    let raw = raw_parameters(cli)?;
    resolve(&raw).context("Invalid pipeline parameters")
}

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "'{}' already exists. Use --force to overwrite it.",
            output.display()
        );
    }
    std::fs::write(output, generate_default_parameters())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Parameters written to {}", output.display());
    Ok(())
}

fn cmd_validate(cli: &Cli, format: OutputFormat) -> Result<()> {
    let config = configuration(cli)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => display::print_configuration(&config),
    }
    Ok(())
}

fn cmd_plan(cli: &Cli, format: OutputFormat) -> Result<()> {
    let config = configuration(cli)?;
    let plan = ResourcePlan::resolve(&config)?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "pipeline": plan.topology.name,
                "repository": {
                    "name": plan.repository.name,
                    "arn": plan.repository.arn.to_string(),
                    "provenance": plan.repository.provenance,
                },
                "retention": plan.retention,
                "resources": plan.resources,
                "actions": plan.scans.iter().map(|s| s.name).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => display::print_plan(&plan),
    }
    Ok(())
}

fn cmd_synth(
    cli: &Cli,
    format: TemplateFormat,
    pin_retention: bool,
    output: Option<&Path>,
    diff: Option<&Path>,
    nag_checks: bool,
) -> Result<()> {
    let config = configuration(cli)?;
    let layout = if pin_retention {
        RetentionLayout::Pinned(config.retention)
    } else {
        RetentionLayout::Parameterized
    };
    let template = Template::synthesize(&config, layout)?;

    if nag_checks {
        let findings = nag::check(&template);
        display::print_nag_findings(&findings);
        let errors = nag::error_count(&findings);
        if errors > 0 {
            anyhow::bail!("Template failed {} AwsSolutions check(s)", errors);
        }
    }
    let rendered = match format {
        TemplateFormat::Json => template.to_json()?,
        TemplateFormat::Yaml => template.to_yaml()?,
    };

    if let Some(previous) = diff {
        let original = std::fs::read_to_string(previous)
            .with_context(|| format!("Failed to read {}", previous.display()))?;
        display::print_diff(&original, &rendered, &previous.to_string_lossy());
        return Ok(());
    }

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), resources = template.resources.len(), "template written");
            println!("Template written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn cmd_buildspec(cli: &Cli, action: &str, bucket: &str) -> Result<()> {
    let config = configuration(cli)?;
    let scans = actions::registry(&config);

    let spec = if action.eq_ignore_ascii_case(AGGREGATION_ACTION_PREFIX) {
        AggregationStep::new(&config, scans.len()).build_spec(bucket)
    } else {
        match actions::find(&scans, action) {
            Some(scan) => scan.build_spec(bucket),
            None => {
                let names: Vec<&str> = scans.iter().map(|s| s.name).collect();
                anyhow::bail!(
                    "Unknown action '{}'. Available: {}, {}",
                    action,
                    names.join(", "),
                    AGGREGATION_ACTION_PREFIX
                );
            }
        }
    };
    print!("{}", spec.to_yaml()?);
    Ok(())
}

fn cmd_graph(cli: &Cli, format: GraphFormat) -> Result<()> {
    let config = configuration(cli)?;
    let plan = ResourcePlan::resolve(&config)?;
    let dag = plan.topology.to_dag()?;
    let rendered = match format {
        GraphFormat::Mermaid => graph::to_mermaid(&dag),
        GraphFormat::Dot => graph::to_dot(&dag),
        GraphFormat::Ascii => graph::to_ascii(&dag),
    };
    println!("{}", rendered);
    Ok(())
}

fn cmd_aggregate(
    cli: &Cli,
    store: &Path,
    history: &Path,
    start_time: &str,
    execution_id: &str,
    no_wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = configuration(cli)?;
    let execution = ExecutionKey::new(start_time, execution_id).with_context(|| {
        format!(
            "Invalid execution key: start time '{}', execution id '{}'",
            start_time, execution_id
        )
    })?;
    let request = AggregationRequest::new(&config, execution, &actions::registry(&config));
    let policy = if no_wait {
        PollPolicy::immediate()
    } else {
        PollPolicy::default()
    };

    let store = LocalDirStore::new(store);
    let history = JsonHistoryFile::new(history);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime
        .block_on(aggregate(&store, &history, &request, &policy))
        .context("Aggregation failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => display::print_aggregation(&result),
    }
    Ok(())
}
