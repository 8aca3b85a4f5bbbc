//! # Conveyor — assistant pipeline orchestration
//!
//! Usage:
//!   conveyor run                                    # Start the scheduler loop
//!   conveyor exec -a asst_1 -f sendOutput '{...}'   # Execute one function call
//!   conveyor events list                            # Show scheduled events
//!   conveyor graph                                  # Show the pipeline graph
//!   conveyor schemas                                # Show object schemas

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conveyor_assistants::AssistantClient;
use conveyor_core::{ConveyorConfig, TracingSink};
use conveyor_engine::{FunctionEngine, FunctionsStore, OutputRouter, ShellInvoker};
use conveyor_graph::GraphStore;
use conveyor_objects::{InstanceStore, SchemaRegistry};
use conveyor_scheduler::{
    EventPayload, EventProps, EventStore, RecurrenceRule, ScheduledEvent, Scheduler,
};

#[derive(Parser)]
#[command(
    name = "conveyor",
    version,
    about = "🔀 Conveyor — assistant pipeline orchestration"
)]
struct Cli {
    /// Config file (default: ~/.conveyor/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the event scheduler and keep running
    Run,
    /// Execute a single function call against an assistant's pipeline
    Exec {
        /// Assistant id the call is attributed to
        #[arg(short, long)]
        assistant: String,
        /// Function name
        #[arg(short, long)]
        function: String,
        /// JSON argument object
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Inspect scheduled events
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },
    /// Show the pipeline graph for the active profile
    Graph,
    /// Show the object schemas for the active profile
    Schemas,
}

#[derive(Subcommand)]
enum EventsAction {
    /// List events for the active profile/project
    List,
    /// Create or replace a scheduled event
    Add {
        /// Event id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        title: String,
        /// RFC 3339 start timestamp
        #[arg(long)]
        start: String,
        /// iCalendar RRULE for recurring events (e.g. FREQ=WEEKLY)
        #[arg(long)]
        rrule: Option<String>,
        /// Assistant the event dispatches to
        #[arg(short, long)]
        assistant: String,
        /// Message sent when the event fires
        #[arg(short, long)]
        message: String,
    },
    /// Remove an event (and cancel its timer on the next run)
    Remove { id: String },
}

fn load_config(cli: &Cli) -> Result<ConveyorConfig> {
    Ok(match &cli.config {
        Some(path) => {
            let expanded = shellexpand::tilde(path).to_string();
            ConveyorConfig::load_from(std::path::Path::new(&expanded))?
        }
        None => ConveyorConfig::load()?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "conveyor=debug,conveyor_engine=debug,conveyor_scheduler=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    let data_dir = config.data_dir();
    let profile = config.active_profile.clone();
    let project = config.active_project.clone();

    match cli.command {
        Command::Run => {
            if !config.scheduler.enabled {
                anyhow::bail!("scheduler is disabled in the config");
            }
            let sender = Arc::new(AssistantClient::new(&config.api));
            let instances = Arc::new(tokio::sync::Mutex::new(InstanceStore::open(
                &data_dir, &profile,
            )));
            let store = EventStore::open(&data_dir, &profile, &project);
            let scheduler = Scheduler::new(store, sender, instances, Arc::new(TracingSink));
            scheduler.load().await?;

            tracing::info!("📅 scheduler running for {profile}/{project}, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown().await;
        }
        Command::Exec {
            assistant,
            function,
            args,
        } => {
            let args: serde_json::Value = serde_json::from_str(&args)?;
            let sender = Arc::new(AssistantClient::new(&config.api));
            let diag = Arc::new(TracingSink);
            let router = OutputRouter::new(
                SchemaRegistry::open(&data_dir, &profile),
                InstanceStore::open(&data_dir, &profile),
                sender,
                diag.clone(),
            );
            let mut engine = FunctionEngine::new(
                data_dir.clone(),
                profile.clone(),
                FunctionsStore::new(&data_dir),
                Arc::new(ShellInvoker),
                GraphStore::open(&data_dir, &profile),
                router,
                diag,
            );
            let result = engine.execute(&function, &args, &assistant).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Events { action } => {
            let mut store = EventStore::open(&data_dir, &profile, &project);
            match action {
                EventsAction::List => {
                    for event in store.events() {
                        let kind = if event.is_recurring() {
                            "recurring"
                        } else {
                            "one-shot"
                        };
                        println!(
                            "{}  {}  [{kind}]  {}  status={}",
                            event.id,
                            event.start,
                            event.title,
                            event.props.status.as_deref().unwrap_or("pending"),
                        );
                    }
                }
                EventsAction::Add {
                    id,
                    title,
                    start,
                    rrule,
                    assistant,
                    message,
                } => {
                    let event = ScheduledEvent {
                        id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        title,
                        start,
                        rrule,
                        props: EventProps {
                            assistant_id: assistant,
                            payload: EventPayload::Message { message },
                            status: None,
                            last_run: None,
                            error: None,
                            completed_occurrences: Vec::new(),
                        },
                    };
                    if event.start_time().is_none() {
                        anyhow::bail!("start must be an RFC 3339 timestamp");
                    }
                    if let Some(rule) = &event.rrule {
                        rule.parse::<RecurrenceRule>()?;
                    }
                    store.upsert(event.clone())?;
                    println!("added {}", event.id);
                }
                EventsAction::Remove { id } => {
                    store.remove(&id)?;
                    println!("removed {id}");
                }
            }
        }
        Command::Graph => {
            let graph = GraphStore::open(&data_dir, &profile);
            let state = graph.state();
            println!("{} nodes, {} connections", state.nodes.len(), state.connections.len());
            for node in &state.nodes {
                let outputs: Vec<&str> = node.outputs.iter().map(|p| p.name.as_str()).collect();
                println!("  {}  {}  outputs: [{}]", node.id, node.name, outputs.join(", "));
            }
            for conn in &state.connections {
                println!(
                    "  {}:{} -> {}:{}",
                    conn.from_node, conn.from_output, conn.to_node, conn.to_input
                );
            }
        }
        Command::Schemas => {
            let registry = SchemaRegistry::open(&data_dir, &profile);
            for schema in registry.list() {
                println!(
                    "{}  {}  v{}  ({} fields)",
                    schema.id,
                    schema.name,
                    schema.version,
                    schema.fields.len()
                );
            }
        }
    }

    Ok(())
}
