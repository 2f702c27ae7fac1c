//! crawlq CLI — operator interface to the URL distributor.

use chrono::Utc;
use clap::{Parser, Subcommand};
use crawlq::config::Config;
use crawlq::dispatch::{Admission, Dispatch, RedisDispatcher};
use crawlq::model::QueueItem;
use crawlq::shutdown::ShutdownCoordinator;
use crawlq::status::{StatusClient, StatusReporter, read_heartbeats};
use crawlq::supervisor::{ConnectionSupervisor, RetryPolicy};
use crawlq::telemetry::{TelemetryConfig, init_telemetry};
use crawlq::worker::{FetchProcessor, NoOpProcessor, Processor, WorkerConfig, WorkerPool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "crawlq", about = "Redis-backed URL distribution for a crawl pipeline")]
struct Cli {
    /// Store host (overrides REDIS_HOST)
    #[arg(long, global = true)]
    redis_host: Option<String>,
    /// Store port (overrides REDIS_PORT)
    #[arg(long, global = true)]
    redis_port: Option<u16>,
    /// Store database number (overrides REDIS_DB)
    #[arg(long, global = true)]
    redis_db: Option<u32>,
    /// Queue name (overrides QUEUE_NAME)
    #[arg(long, global = true)]
    queue: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool until signalled
    Serve {
        /// Number of workers (overrides NUM_WORKERS)
        #[arg(long)]
        workers: Option<u32>,
        /// Newline-delimited URL file admitted through the dedup path
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Fetch each URL instead of just draining the queue
        #[arg(long)]
        fetch: bool,
    },
    /// Admit a single URL
    Enqueue {
        url: String,
        /// JSON metadata to attach
        #[arg(long)]
        metadata: Option<String>,
        /// Bypass the dedup ledger
        #[arg(long)]
        force: bool,
    },
    /// Queue introspection and reset
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Show worker heartbeats
    Status,
}

#[derive(Subcommand)]
enum QueueAction {
    /// Pending and in-flight counts
    Size,
    /// Head of the pending queue, without removing it
    Peek,
    /// Empty the pending queue, in-flight ledger, and dedup ledger
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.redis_host {
        config.redis_host = host;
    }
    if let Some(port) = cli.redis_port {
        config.redis_port = port;
    }
    if let Some(db) = cli.redis_db {
        config.redis_db = db;
    }
    if let Some(queue) = cli.queue {
        config.queue_name = queue;
    }

    match cli.command {
        Command::Serve {
            workers,
            seed,
            fetch,
        } => cmd_serve(config, workers, seed, fetch).await,
        Command::Enqueue {
            url,
            metadata,
            force,
        } => cmd_enqueue(config, url, metadata, force).await,
        Command::Queue { action } => cmd_queue(config, action).await,
        Command::Status => cmd_status(config).await,
    }
}

async fn cmd_serve(
    config: Config,
    workers: Option<u32>,
    seed: Option<PathBuf>,
    fetch: bool,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "crawlq".to_string(),
    })?;

    let supervisor = match connect(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot establish store connection, giving up");
            return Err(e.into());
        }
    };
    let store = Arc::clone(supervisor.store());
    let dispatcher = Arc::new(RedisDispatcher::new(Arc::clone(&store), &config.queue_name));

    if let Some(path) = seed {
        seed_queue(dispatcher.as_ref(), &path).await?;
    }

    let reporter = Arc::new(match &config.status_url {
        Some(url) => StatusReporter::Http(StatusClient::new(url.clone())),
        None => StatusReporter::Direct(Arc::clone(&store)),
    });

    let mut worker_config = WorkerConfig::from_config(&config);
    if let Some(n) = workers {
        worker_config.num_workers = n;
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals();

    if fetch {
        let processor = Arc::new(FetchProcessor::new()?);
        run_pool(dispatcher, processor, supervisor, reporter, worker_config, &shutdown).await?;
    } else {
        let processor = Arc::new(NoOpProcessor);
        run_pool(dispatcher, processor, supervisor, reporter, worker_config, &shutdown).await?;
    }

    info!("shutdown complete");
    Ok(())
}

async fn run_pool<P: Processor + 'static>(
    dispatcher: Arc<RedisDispatcher>,
    processor: Arc<P>,
    supervisor: Arc<ConnectionSupervisor>,
    reporter: Arc<StatusReporter>,
    worker_config: WorkerConfig,
    shutdown: &ShutdownCoordinator,
) -> anyhow::Result<()> {
    WorkerPool::new(dispatcher, processor, worker_config)
        .with_supervisor(supervisor)
        .with_reporter(reporter)
        .run(shutdown)
        .await?;
    Ok(())
}

/// Admit every non-empty line of a seed file through the dedup path.
async fn seed_queue(dispatcher: &RedisDispatcher, path: &Path) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(path).await?;
    let mut admitted = 0usize;
    let mut duplicates = 0usize;
    for line in contents.lines() {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        match dispatcher.enqueue_with_dedup(&QueueItem::new(url)).await? {
            Admission::Admitted => admitted += 1,
            Admission::Duplicate => duplicates += 1,
        }
    }
    info!(admitted, duplicates, path = %path.display(), "seed file loaded");
    Ok(())
}

async fn cmd_enqueue(
    config: Config,
    url: String,
    metadata: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let supervisor = connect(&config).await?;
    let dispatcher =
        RedisDispatcher::new(Arc::clone(supervisor.store()), &config.queue_name);

    let mut item = QueueItem::new(&url);
    if let Some(raw) = metadata {
        item = item.metadata(serde_json::from_str(&raw)?);
    }

    if force {
        dispatcher.enqueue(&item).await?;
        println!("Enqueued (dedup bypassed): {url}");
    } else {
        match dispatcher.enqueue_with_dedup(&item).await? {
            Admission::Admitted => println!("Enqueued: {url}"),
            Admission::Duplicate => println!("Duplicate: {url} already admitted"),
        }
    }
    Ok(())
}

async fn cmd_queue(config: Config, action: QueueAction) -> anyhow::Result<()> {
    let supervisor = connect(&config).await?;
    let dispatcher =
        RedisDispatcher::new(Arc::clone(supervisor.store()), &config.queue_name);

    match action {
        QueueAction::Size => {
            println!("Pending:   {}", dispatcher.size().await?);
            println!("In flight: {}", dispatcher.in_flight().await?);
        }
        QueueAction::Peek => match dispatcher.peek().await? {
            Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
            None => println!("Queue is empty."),
        },
        QueueAction::Clear => {
            dispatcher.clear().await?;
            println!("Cleared queue '{}'.", config.queue_name);
        }
    }
    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    let supervisor = connect(&config).await?;
    let heartbeats = read_heartbeats(supervisor.store()).await?;

    if heartbeats.is_empty() {
        println!("No worker heartbeats found.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<8}  {:<25}  AGE", "WORKER", "LAST_SEEN");
    println!("{}", "-".repeat(50));
    for hb in &heartbeats {
        println!(
            "{:<8}  {:<25}  {}s",
            hb.worker_id,
            hb.last_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
            hb.staleness(now)
        );
    }
    println!("\n{} worker(s)", heartbeats.len());
    Ok(())
}

async fn connect(config: &Config) -> crawlq::error::Result<Arc<ConnectionSupervisor>> {
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        retry_delay: config.retry_delay,
    };
    ConnectionSupervisor::establish(&config.redis_url(), policy)
        .await
        .map(Arc::new)
}
