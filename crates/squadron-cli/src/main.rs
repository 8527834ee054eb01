//! Squadron command-line entry point.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use squadron_orchestrator::{
    build_schedule, AutoApproveExecutor, AutoAssigner, AutoReviewEngine, HeartbeatConfig,
    HeartbeatRunner, HttpLivenessEndpoint, LivenessEndpoint, NotificationMailbox, QueueTrigger,
    QueueTriggerConfig, ReviewConfig, StoreLivenessEndpoint,
};
use squadron_store::StoreGateway;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "squadron", about = "Squadron — agent fleet coordinator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "squadron.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the heartbeat daemon (cron-paced cycles)
    Daemon,
    /// Run one heartbeat cycle and print per-agent outcomes
    Cycle,
    /// Print the current heartbeat schedule
    Schedule,
    /// Probe the Nth agent of the schedule directly
    Trigger {
        /// Zero-based roster index
        index: usize,
    },
    /// Resolve and apply an assignee for a task
    Assign {
        /// Task id
        task_id: String,
    },
    /// Auto-review a task's latest completed result
    Review {
        /// Task id
        task_id: String,
    },
    /// Auto-review a task, then execute the verdict's decision
    Process {
        /// Task id
        task_id: String,
    },
}

#[derive(Deserialize)]
struct SquadronConfig {
    #[serde(default = "default_db_path")]
    db_path: PathBuf,
    #[serde(default)]
    heartbeat: HeartbeatConfig,
    #[serde(default)]
    review: ReviewConfig,
    #[serde(default)]
    queue: QueueTriggerConfig,
    #[serde(default)]
    endpoint: EndpointConfig,
}

impl Default for SquadronConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            heartbeat: HeartbeatConfig::default(),
            review: ReviewConfig::default(),
            queue: QueueTriggerConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

/// Where liveness probes go: the local store, or an HTTP service.
#[derive(Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum EndpointConfig {
    /// In-process endpoint backed by the store.
    Local,
    /// Remote endpoint reached over HTTP.
    Http {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig::Local
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./squadron.db")
}
fn default_timeout_secs() -> u64 {
    10
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config: SquadronConfig = if cli.config.exists() {
        let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                cli.config.display(),
                e
            )
        })?;
        toml::from_str(&config_str)?
    } else {
        info!(path = %cli.config.display(), "no config file, using defaults");
        SquadronConfig::default()
    };

    let store = Arc::new(StoreGateway::open(&config.db_path)?);
    let mailbox = Arc::new(NotificationMailbox::new());
    let endpoint: Arc<dyn LivenessEndpoint> = match &config.endpoint {
        EndpointConfig::Local => Arc::new(StoreLivenessEndpoint::new(Arc::clone(&store))),
        EndpointConfig::Http { url, timeout_secs } => Arc::new(HttpLivenessEndpoint::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    };
    let (queue, mut queue_rx) = QueueTrigger::new(Arc::clone(&store), config.queue.clone());
    let runner = HeartbeatRunner::new(
        Arc::clone(&store),
        Arc::clone(&mailbox),
        endpoint,
        config.heartbeat.clone(),
    );

    match cli.command {
        Commands::Daemon => {
            info!(db = %config.db_path.display(), "starting heartbeat daemon");
            let queue_for_loop = Arc::clone(&queue);
            tokio::spawn(async move {
                // Task production itself lives outside this binary; the
                // daemon just logs the signal and re-arms the trigger.
                while queue_rx.recv().await.is_some() {
                    info!("production cycle signal received");
                    queue_for_loop.cycle_finished();
                }
            });
            let handle = runner.start_daemon()?;
            handle.await?;
        }
        Commands::Cycle => {
            let outcomes = runner.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Commands::Schedule => {
            let schedule = build_schedule(&store)?;
            println!("{}", serde_json::to_string_pretty(&schedule)?);
        }
        Commands::Trigger { index } => {
            let report = runner.trigger_index(index).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Assign { task_id } => {
            let assigner = AutoAssigner::new(Arc::clone(&store));
            match assigner.assign(&task_id)? {
                Some(agent_id) => println!("{}", serde_json::json!({ "assignee": agent_id })),
                None => println!("{}", serde_json::json!({ "assignee": null })),
            }
        }
        Commands::Review { task_id } => {
            let engine = AutoReviewEngine::new(Arc::clone(&store), config.review.clone());
            let verdict = engine.auto_review(&task_id)?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Process { task_id } => {
            let engine = AutoReviewEngine::new(Arc::clone(&store), config.review.clone());
            let verdict = engine.auto_review(&task_id)?;
            let executor = AutoApproveExecutor::new(Arc::clone(&store), Arc::clone(&queue));
            let final_status = executor.process(&task_id)?;
            println!(
                "{}",
                serde_json::json!({
                    "decision": verdict.decision,
                    "finalStatus": final_status,
                })
            );
        }
    }

    Ok(())
}
