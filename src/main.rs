use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trellis_core::config::AppConfig;
use trellis_core::graph::WorkflowDefinition;
use trellis_core::run::{ExecutionRequest, Identity, InputValue};
use trellis_core::traits::ExecutionStore;
use trellis_engine::{behaviors, NodeExecutor, WorkflowRunner};
use trellis_providers::HandlerRegistry;
use trellis_store::SqliteStore;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Workflow graph execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "trellis.toml")]
    config: PathBuf,

    /// User id that owns the workflows
    #[arg(short, long, default_value = "local", env = "TRELLIS_USER")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow by id
    Run {
        workflow_id: String,
        /// Initial inputs as key=value pairs (e.g. --input input_1=hello)
        #[arg(short, long = "input")]
        inputs: Vec<String>,
        /// Run mode
        #[arg(long, default_value = "standard")]
        mode: String,
    },
    /// Import a workflow definition from a JSON file
    Import { file: PathBuf },
    /// Export a workflow definition as JSON to stdout
    Export { workflow_id: String },
    /// List workflows
    List,
    /// Show a stored execution record
    Execution { execution_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    let store = Arc::new(SqliteStore::open(&config.database_path())?);
    let identity = Identity::new(cli.user.clone());

    match cli.command {
        Commands::Run {
            workflow_id,
            inputs,
            mode,
        } => {
            let registry = HandlerRegistry::from_config(&config.providers);
            let mut executor = NodeExecutor::with_defaults();
            for profile in behaviors::VENDORS {
                if let Some(handler) = registry.get(profile.tag) {
                    executor.register_provider(profile, handler);
                }
            }

            let engine_store: Arc<dyn ExecutionStore> = store.clone();
            let runner = WorkflowRunner::new(executor, engine_store);

            let mut request = ExecutionRequest::new();
            request.mode = mode;
            for pair in &inputs {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("invalid --input '{}', expected key=value", pair))?;
                request.inputs.insert(
                    key.to_string(),
                    InputValue::Raw(serde_json::Value::String(value.to_string())),
                );
            }

            let result = runner.run_by_id(&workflow_id, request, &identity).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let definition: WorkflowDefinition = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", file.display()))?;
            let workflow = store.create_workflow(&identity.user_id, definition)?;
            println!("{}  {}", workflow.id, workflow.name);
        }
        Commands::Export { workflow_id } => {
            let definition = store.export_workflow(&workflow_id, &identity.user_id)?;
            println!("{}", serde_json::to_string_pretty(&definition)?);
        }
        Commands::List => {
            for workflow in store.list_workflows(&identity.user_id)? {
                println!(
                    "{}  {}  ({} nodes, {} edges)",
                    workflow.id,
                    workflow.name,
                    workflow.nodes.len(),
                    workflow.edges.len()
                );
            }
        }
        Commands::Execution { execution_id } => match store.get_execution(&execution_id)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("execution not found: {}", execution_id),
        },
    }

    Ok(())
}
