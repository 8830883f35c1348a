//! stats-flow - run statistical workflows from the command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use dataflow_engine::{
    export_report, ChannelEventSink, DatasetContext, EngineConfig, ExecuteRequest, ReportFormat,
    WorkflowDefinition, WorkflowEvent, WorkflowService,
};
use stats_widgets::{builtin_registry, CsvFileWidget};

/// stats-flow - validate and run statistical analysis workflows
#[derive(Parser)]
#[command(name = "stats-flow")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the widget catalog as JSON
    Widgets,

    /// Check a workflow file without running it
    Validate {
        /// Path to the workflow definition (JSON)
        workflow_file: PathBuf,
    },

    /// Run a workflow and print its report
    Run {
        /// Path to the workflow definition (JSON)
        workflow_file: PathBuf,

        /// Dataset context file (JSON with `datasets` and `parameters`)
        #[arg(long)]
        datasets: Option<PathBuf>,

        /// Load a CSV file as a dataset, as ID=PATH (repeatable)
        #[arg(long = "csv", value_name = "ID=PATH")]
        csv: Vec<String>,

        /// Report format: json or csv
        #[arg(long, default_value = "json")]
        format: ReportFormat,

        /// Print run events to stderr as they happen
        #[arg(long)]
        events: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Some(Commands::Widgets) => list_widgets(),
        Some(Commands::Validate { workflow_file }) => {
            rt.block_on(validate_workflow(workflow_file, cli.config))
        }
        Some(Commands::Run {
            workflow_file,
            datasets,
            csv,
            format,
            events,
        }) => rt.block_on(run_workflow(RunArgs {
            workflow_file,
            config: cli.config,
            datasets,
            csv,
            format,
            events,
        })),
        None => {
            println!("stats-flow - use --help to see available commands");
            Ok(())
        }
    }
}

struct RunArgs {
    workflow_file: PathBuf,
    config: Option<PathBuf>,
    datasets: Option<PathBuf>,
    csv: Vec<String>,
    format: ReportFormat,
    events: bool,
}

fn list_widgets() -> Result<()> {
    let registry = builtin_registry();
    let widgets: Vec<_> = registry.list_widgets();
    println!("{}", serde_json::to_string_pretty(&widgets)?);
    Ok(())
}

async fn load_service(config: Option<PathBuf>) -> Result<WorkflowService> {
    let config = match config {
        Some(path) => EngineConfig::load(&path)
            .await
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(WorkflowService::new(Arc::new(builtin_registry()), &config))
}

async fn read_workflow(workflow_file: &Path) -> Result<WorkflowDefinition> {
    let content = tokio::fs::read_to_string(workflow_file)
        .await
        .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
    WorkflowDefinition::from_json(&content)
        .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

async fn validate_workflow(workflow_file: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let service = load_service(config).await?;
    let definition = read_workflow(&workflow_file).await?;
    let request = ExecuteRequest::from_definition(definition, DatasetContext::new());

    let (graph, plan) = service.plan(&request)?;
    eprintln!(
        "Workflow '{}' is valid: {} node(s) in {} batch(es)",
        graph.name(),
        plan.node_count(),
        plan.len()
    );
    println!("{}", serde_json::to_string_pretty(plan.batches())?);
    Ok(())
}

async fn load_datasets(args: &RunArgs) -> Result<DatasetContext> {
    let mut context = match &args.datasets {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read datasets file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse datasets file: {}", path.display()))?
        }
        None => DatasetContext::new(),
    };

    for entry in &args.csv {
        let (id, path) = entry
            .split_once('=')
            .with_context(|| format!("expected ID=PATH, got '{}'", entry))?;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read CSV file: {}", path))?;
        let table = CsvFileWidget::parse(&text, b',', true)
            .with_context(|| format!("failed to parse CSV file: {}", path))?;
        eprintln!("Loaded dataset '{}': {} row(s)", id, table.row_count());
        context = context.with_dataset(id, table.into());
    }
    Ok(context)
}

async fn run_workflow(args: RunArgs) -> Result<()> {
    let mut service = load_service(args.config.clone()).await?;
    let definition = read_workflow(&args.workflow_file).await?;
    eprintln!("Loaded workflow: {}", definition.name);

    let context = load_datasets(&args).await?;
    let request = ExecuteRequest::from_definition(definition, context);

    let printer = if args.events {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WorkflowEvent>();
        service = service.with_event_sink(Arc::new(ChannelEventSink::new(tx)));
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        }))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let cancel_on_interrupt = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        log::warn!("Interrupted, cancelling run");
        cancel_on_interrupt.cancel();
    });

    let report = service
        .execute_report(request, cancel)
        .await
        .context("workflow execution failed")?;

    // Dropping the service closes the event channel so the printer drains and exits
    drop(service);
    if let Some(printer) = printer {
        printer.await.ok();
    }

    eprintln!("Execution completed: {}", report.execution_id);
    let output = export_report(&report, args.format)?;
    println!("{}", String::from_utf8_lossy(&output));

    if !report.is_success() {
        bail!(
            "{} node(s) failed, {} blocked",
            report.failed_nodes().len(),
            report.blocked_nodes().len()
        );
    }
    Ok(())
}
