use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dotalytics_broker::{BrokerConfig, RabbitBroker};
use dotalytics_client::{OpenDotaClient, OpenDotaConfig};
use dotalytics_core::job::{JobStatus, JobType, WorkerConfig};
use dotalytics_core::worker::TracingWorkerReporter;
use dotalytics_core::{IngestionPipeline, JobService, RateLimiter, Worker};
use dotalytics_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "dotalytics", version, about = "Match data ingestion worker and job control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue-consuming ingestion worker until interrupted
    Worker,

    /// Create a job and publish it to the queue
    Enqueue {
        /// Job type: IngestHeroes, IngestMatches, or AggregateStats
        #[arg(short, long)]
        job_type: String,

        /// Optional scope string attached to the job
        #[arg(short, long)]
        target: Option<String>,
    },

    /// List jobs, newest first
    Jobs {
        /// Filter by status: pending, running, done, or failed
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },

    /// Re-queue a failed job
    Retry {
        /// Job id to retry
        #[arg(short, long)]
        id: i64,
    },

    /// Show aggregate statistics from ingested matches
    Stats {
        /// Number of entries per leaderboard
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dotalytics=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker => cmd_worker().await?,
        Commands::Enqueue { job_type, target } => {
            let job_type: JobType = job_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            cmd_enqueue(job_type, target.as_deref()).await?;
        }
        Commands::Jobs {
            status,
            page,
            page_size,
        } => {
            let status = status
                .map(|s| s.parse::<JobStatus>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            cmd_jobs(page, page_size, status).await?;
        }
        Commands::Retry { id } => cmd_retry(id).await?,
        Commands::Stats { count } => cmd_stats(count).await?,
    }

    Ok(())
}

/// Connect to PostgreSQL and run migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn connect_broker() -> Result<RabbitBroker> {
    let config = BrokerConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    Ok(RabbitBroker::connect(config).await)
}

async fn cmd_worker() -> Result<()> {
    if let Ok(raw) = std::env::var("WORKER_ENABLED")
        && matches!(raw.to_lowercase().as_str(), "false" | "0" | "no")
    {
        tracing::warn!("WORKER_ENABLED is off, exiting");
        return Ok(());
    }

    let db = connect_db().await?;
    let broker = connect_broker().await?;

    let api_config = OpenDotaConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let client = OpenDotaClient::new(&api_config).map_err(|e| anyhow::anyhow!(e))?;
    let limiter = RateLimiter::new(api_config.rate_limit_per_minute);
    let pipeline = IngestionPipeline::new(client, db.match_repo(), limiter);

    let config = WorkerConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let worker = Worker::new(broker, pipeline, db.job_repo(), config);

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    worker
        .run(cancel_token, &TracingWorkerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

async fn cmd_enqueue(job_type: JobType, target: Option<&str>) -> Result<()> {
    let db = connect_db().await?;
    let broker = connect_broker().await?;
    let service = JobService::new(db.job_repo(), broker);

    let job = service
        .create_job(job_type, target)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Enqueued job {} ({})", job.id, job.job_type);
    Ok(())
}

async fn cmd_jobs(page: usize, page_size: usize, status: Option<JobStatus>) -> Result<()> {
    let db = connect_db().await?;
    let broker = connect_broker().await?;
    let service = JobService::new(db.job_repo(), broker);

    let jobs = service
        .list_jobs(page, page_size, status)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in &jobs {
        let error = job.error.as_deref().unwrap_or("-");
        println!(
            "  [{:>7}] #{} {} — processed: {}, retries: {}, created: {}, error: {}",
            job.status.as_str(),
            job.id,
            job.job_type,
            job.matches_processed,
            job.retries,
            job.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            error,
        );
    }

    let active = service.active_job_count().await.map_err(|e| anyhow::anyhow!(e))?;
    match service.queue_depth().await {
        Ok(depth) => println!("\nActive jobs: {active}, queue depth: {depth}"),
        Err(_) => println!("\nActive jobs: {active}, queue depth: unavailable"),
    }

    Ok(())
}

async fn cmd_retry(id: i64) -> Result<()> {
    let db = connect_db().await?;
    let broker = connect_broker().await?;
    let service = JobService::new(db.job_repo(), broker);

    let job = service.retry_job(id).await.map_err(|e| anyhow::anyhow!(e))?;
    println!("Job {} re-queued (retry #{})", job.id, job.retries);
    Ok(())
}

async fn cmd_stats(count: usize) -> Result<()> {
    let db = connect_db().await?;
    let repo = db.match_repo();

    let heroes = repo
        .top_heroes_by_win_rate(count, 5)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("Top heroes by win rate (min 5 picks):");
    if heroes.is_empty() {
        println!("  (no data)");
    }
    for hero in &heroes {
        println!(
            "  {:<24} {:>5.1}% ({} picks)",
            hero.name, hero.win_rate, hero.total_picks
        );
    }

    let players = repo
        .top_players_by_kda(count, 3)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("\nTop players by KDA (min 3 matches):");
    if players.is_empty() {
        println!("  (no data)");
    }
    for player in &players {
        let name = player.name.as_deref().unwrap_or("(anonymous)");
        println!(
            "  {:<24} {:>5.2} KDA over {} matches",
            name, player.kda, player.total_matches
        );
    }

    let volume = repo
        .match_volume_by_hour(24)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("\nMatches ingested in the last 24h:");
    if volume.is_empty() {
        println!("  (no data)");
    }
    for bucket in &volume {
        println!(
            "  {} — {}",
            bucket.hour.format("%Y-%m-%d %H:00 UTC"),
            bucket.matches
        );
    }

    Ok(())
}
