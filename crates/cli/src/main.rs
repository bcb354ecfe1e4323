//! `agentflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`      — execute a workflow JSON file against offline echo providers.
//! - `validate` — validate a workflow JSON file.
//! - `order`    — print the execution order from the input node.
//! - `import`   — convert a flow export into a workflow.
//! - `export`   — convert a workflow into a flow export.
//! - `list`     — list the workflows in a store directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::{
    AgentWorkflow, EventBus, EventSink, ExecutorConfig, ProviderRegistry, TracingSink,
    WorkflowEvent, WorkflowExecutor, dag, import,
};
use engine::events::FanoutSink;
use providers::{EchoProvider, Provider};
use store::{FileRepository, WorkflowRepository};

#[derive(Parser)]
#[command(
    name = "agentflow",
    about = "Run and inspect AI agent workflows",
    version
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true, env = "AGENTFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow. Agent nodes are answered by echo providers.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Text fed to the input node.
        #[arg(long, short)]
        input: String,
        /// Fail any node whose provider call takes longer than this.
        #[arg(long)]
        node_timeout_secs: Option<u64>,
        /// Provider identifiers to register (each echoes its input).
        #[arg(long = "provider", default_values = ["claude", "gpt"])]
        providers: Vec<String>,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        path: PathBuf,
    },
    /// Print the order nodes would be dispatched in.
    Order {
        path: PathBuf,
    },
    /// Convert a flow export into a workflow JSON file.
    Import {
        /// Path to the flow export.
        path: PathBuf,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Write here instead of stdout.
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Save into this store directory instead of writing a file.
        #[arg(long, conflicts_with = "out")]
        store: Option<PathBuf>,
    },
    /// Convert a workflow JSON file into a flow export.
    Export {
        path: PathBuf,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// List workflows saved in a store directory.
    List {
        #[arg(long, env = "AGENTFLOW_STORE", default_value = "./workflows")]
        store: PathBuf,
    },
}

/// Contents of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    executor: ExecutorConfig,
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

fn read_workflow(path: &Path) -> Result<AgentWorkflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn write_output(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{content}");
            Ok(())
        }
    }
}

/// Hand every event to `print` until the run's terminal event or until the
/// bus closes. Returns how many events were skipped because the receiver
/// fell behind.
async fn relay_events(
    mut events: broadcast::Receiver<WorkflowEvent>,
    mut print: impl FnMut(&WorkflowEvent),
) -> u64 {
    let mut skipped = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                print(&event);
                if event.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "event printer fell behind; raise event_capacity");
                skipped += n;
            }
            Err(RecvError::Closed) => break,
        }
    }
    skipped
}

fn print_event(event: &WorkflowEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("cannot serialize event: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run { path, input, node_timeout_secs, providers } => {
            let workflow = read_workflow(&path)?;

            let mut executor_config = config.executor;
            if node_timeout_secs.is_some() {
                executor_config.node_timeout_secs = node_timeout_secs;
            }

            let registry: ProviderRegistry = providers
                .into_iter()
                .map(|name| {
                    let provider = EchoProvider::with_prefix(format!("[{name}] "));
                    (name, Arc::new(provider) as Arc<dyn Provider>)
                })
                .collect();

            let bus = Arc::new(EventBus::new(executor_config.event_capacity));
            let printer = tokio::spawn(relay_events(bus.subscribe(), print_event));

            let sink: Arc<dyn EventSink> = Arc::new(FanoutSink(vec![
                bus.clone() as Arc<dyn EventSink>,
                Arc::new(TracingSink),
            ]));
            let executor = WorkflowExecutor::new(registry, sink, executor_config);

            info!(
                timeout = ?executor.config().node_timeout(),
                "Running workflow '{}' ({})",
                workflow.name,
                workflow.id
            );
            let outcome = executor.execute(&workflow, &input).await;
            drop(executor);
            drop(bus);
            let skipped = printer.await.context("event printer panicked")?;
            if skipped > 0 {
                warn!(skipped, "some events were not printed");
            }

            let result = outcome?;
            println!("{result}");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match dag::validate_workflow(&workflow) {
                Ok(order) => println!("Workflow is valid. Topological order: {order:?}"),
                Err(e) => bail!("validation failed: {e}"),
            }
        }
        Command::Order { path } => {
            let workflow = read_workflow(&path)?;
            let (input_node, _) = dag::endpoints(&workflow)?;
            for node_id in dag::execution_order(&workflow, &input_node.id)? {
                let label = workflow
                    .node(&node_id)
                    .map(|n| format!("{} ({})", n.name, n.config.type_tag()))
                    .unwrap_or_else(|| "<missing>".to_string());
                println!("{node_id}\t{label}");
            }
        }
        Command::Import { path, id, name, out, store } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;

            if let (Some(dir), None) = (&store, &id) {
                let repo = FileRepository::open(dir).await?;
                let workflow = repo.import_flow(&raw, name.as_deref()).await?;
                info!("Imported workflow {} into {}", workflow.id, repo.root().display());
                println!("{}", workflow.id);
                return Ok(());
            }

            let fallback_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| store::repository::DEFAULT_IMPORT_NAME.to_string());
            let workflow = import::import_flow_json(
                &raw,
                id.unwrap_or_else(|| fallback_name.clone()),
                name.unwrap_or(fallback_name),
            )?;

            match store {
                Some(dir) => {
                    let repo = FileRepository::open(dir).await?;
                    let workflow = repo.save(workflow).await?;
                    info!("Imported workflow {} into {}", workflow.id, repo.root().display());
                    println!("{}", workflow.id);
                }
                None => write_output(out.as_deref(), &serde_json::to_string_pretty(&workflow)?)?,
            }
        }
        Command::Export { path, out } => {
            let workflow = read_workflow(&path)?;
            let export = import::to_flow_export(&workflow);
            write_output(out.as_deref(), &export.to_json_pretty()?)?;
        }
        Command::List { store } => {
            let repo = FileRepository::open(store).await?;
            for workflow in repo.list().await? {
                println!(
                    "{}\t{}\t{} nodes\tupdated {}",
                    workflow.id,
                    workflow.name,
                    workflow.nodes.len(),
                    workflow.updated_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
