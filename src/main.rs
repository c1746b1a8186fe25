//! statehook - schema-driven workflow engine
//!
//! `check` compiles a schema file and reports its shape. `run` creates an
//! entity and drives it through a sequence of events, printing each response.

use clap::{Parser, Subcommand};
use serde_json::json;
use statehook_core::{ActionRegistry, WorkflowFactory, WorkflowSchema};
use statehook_service::{Config, EntityContext, WorkflowService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statehook")]
#[command(about = "Schema-driven finite state machine engine")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "STATEHOOK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema file and print its states and transitions
    Check {
        /// Schema file (.json, .yaml or .yml)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Create an entity and apply events to it in order
    Run {
        /// Schema file; the built-in review workflow is used when omitted
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Entity title
        #[arg(long, default_value = "Untitled")]
        title: String,

        /// Entity content
        #[arg(long, default_value = "")]
        content: String,

        /// Events to trigger
        events: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Commands::Check { schema } => check(&schema),
        Commands::Run {
            schema,
            title,
            content,
            events,
        } => run(&config, schema, title, content, events).await,
    }
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let schema = WorkflowSchema::from_file(path)?;
    let registry: ActionRegistry<EntityContext> = ActionRegistry::with_builtins();

    let unknown_actions: Vec<&str> = schema
        .states
        .iter()
        .flat_map(|s| s.on_enter.iter().chain(s.on_exit.iter()))
        .chain(schema.transitions.iter().flat_map(|t| t.actions.iter()))
        .map(|a| a.action_type.as_str())
        .filter(|name| !registry.has(name))
        .collect();

    let factory = WorkflowFactory::new(Arc::new(registry)).with_cache(false);
    let definition = factory.compile(&schema)?;

    let shadowed: Vec<_> = definition
        .shadowed_transitions()
        .into_iter()
        .map(|t| json!({"from": t.from, "to": t.to, "event": t.event}))
        .collect();

    let report = json!({
        "id": schema.id,
        "name": schema.name,
        "checksum": schema.checksum(),
        "initialState": definition.initial_state(),
        "states": definition.state_names(),
        "transitions": definition.transitions().len(),
        "shadowedTransitions": shadowed,
        "unknownActions": unknown_actions,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(
    config: &Config,
    schema: Option<PathBuf>,
    title: String,
    content: String,
    events: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = WorkflowService::from_config(config)?;

    let workflow_id = match schema {
        Some(path) => Some(service.create_schema(WorkflowSchema::from_file(path)?)?.id),
        None => None,
    };

    let created = service.create_entity(title, content, workflow_id)?;
    println!("{}", serde_json::to_string(&created)?);

    for event in &events {
        match service.transition(&created.entity.id, event).await {
            Ok(response) => println!("{}", serde_json::to_string(&response)?),
            Err(e) => {
                let failure = json!({
                    "success": false,
                    "event": event,
                    "code": e.error_code(),
                    "message": e.to_string(),
                });
                println!("{}", failure);
            }
        }
    }

    Ok(())
}
