//! jobq CLI: run the poller, submit demo jobs to the job queue, seed payloads.

use clap::{Parser, Subcommand};
use jobq::config::Config;
use jobq::config::secrets::ExposeSecret;
use jobq::config::tuning::Tuning;
use jobq::db::{Db, PgmqQueue};
use jobq::engine::{JobProcessManager, JobProcessor};
use jobq::external::{
    self, ApiClient, BlobStore, FsBlobStore, HttpApiClient, InMemoryBlobStore, InMemoryQueue,
    MessageQueue,
};
use jobq::model::job::{MessageId, WorkInput};
use jobq::poller::{QueuePoller, ShutdownListener};
use jobq::telemetry::{TelemetryConfig, init_telemetry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "jobq", about = "Bounded job queue and external queue poller")]
struct Cli {
    /// TOML file overriding queue, poller and shutdown tuning
    #[arg(long, global = true)]
    tuning: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the external queue poller until Ctrl-C
    Serve {
        /// Use in-process queue and blob store instead of Postgres and the filesystem
        #[arg(long)]
        local: bool,
    },
    /// Submit jobs to an in-process job queue and print the outcomes
    Submit {
        /// Number of jobs to submit
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Fire and forget instead of waiting for each result
        #[arg(long = "async")]
        fire_and_forget: bool,
        /// How long to wait for each synchronous result
        #[arg(long, default_value_t = 2_000)]
        timeout_ms: u64,
    },
    /// Write a payload blob and enqueue its key on the pgmq queue
    Seed {
        /// Blob key referenced by the queued message
        #[arg(long, default_value = "aaa/s3data.txt")]
        key: String,
        /// Last line number written to the payload (lines run from 0)
        #[arg(long, default_value_t = 20)]
        lines: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "jobq".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let tuning = load_tuning(cli.tuning.as_deref())?;

    match cli.command {
        Command::Serve { local } => cmd_serve(&config, &tuning, local).await,
        Command::Submit {
            count,
            fire_and_forget,
            timeout_ms,
        } => {
            cmd_submit(
                &tuning,
                count,
                fire_and_forget,
                Duration::from_millis(timeout_ms),
            )
            .await
        }
        Command::Seed { key, lines } => cmd_seed(&config, &tuning, &key, lines).await,
    }
}

fn load_tuning(path: Option<&Path>) -> anyhow::Result<Tuning> {
    Ok(match path {
        Some(path) => Tuning::load(path)?,
        None => Tuning::default(),
    })
}

async fn connect_queue(config: &Config, tuning: &Tuning) -> anyhow::Result<Arc<PgmqQueue>> {
    let url = config.require_database_url()?;
    let db = Db::connect(url.expose_secret()).await?;
    db.migrate().await?;
    db.health_check().await?;
    let queue = PgmqQueue::new(
        Arc::new(db),
        config.queue_name.clone(),
        tuning.poller_config().visibility_timeout,
    );
    queue.create().await?;
    Ok(Arc::new(queue))
}

async fn cmd_serve(config: &Config, tuning: &Tuning, local: bool) -> anyhow::Result<()> {
    let poller_config = tuning.poller_config();

    let (queue, blobs): (Arc<dyn MessageQueue>, Arc<dyn BlobStore>) = if local {
        let queue = Arc::new(InMemoryQueue::new(
            config.queue_name.clone(),
            poller_config.visibility_timeout,
        ));
        let blobs = Arc::new(InMemoryBlobStore::new());
        external::seed(queue.as_ref(), blobs.as_ref(), "aaa/s3data.txt", 20).await?;
        (queue as Arc<dyn MessageQueue>, blobs as Arc<dyn BlobStore>)
    } else {
        let queue = connect_queue(config, tuning).await?;
        let blobs = Arc::new(FsBlobStore::new(config.blob_dir.clone()));
        (queue as Arc<dyn MessageQueue>, blobs as Arc<dyn BlobStore>)
    };
    let api: Arc<dyn ApiClient> = Arc::new(HttpApiClient::new(
        &config.api_url,
        config.api_token.clone(),
    )?);

    let poller = Arc::new(QueuePoller::new(queue, blobs, api, poller_config));

    let shutdown = CancellationToken::new();
    let scheduler = tokio::spawn({
        let poller = Arc::clone(&poller);
        let shutdown = shutdown.clone();
        async move { poller.run(shutdown).await }
    });

    info!(local, "poller running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();

    let listener = ShutdownListener::new(Arc::clone(&poller), tuning.shutdown_config());
    let outcome = listener.wait().await;
    info!(?outcome, "poller shutdown finished");

    if !scheduler.is_finished() {
        scheduler.abort();
    }
    Ok(())
}

async fn cmd_submit(
    tuning: &Tuning,
    count: u32,
    fire_and_forget: bool,
    timeout: Duration,
) -> anyhow::Result<()> {
    let jobs = JobProcessManager::start(
        tuning.job_config(),
        Arc::new(JobProcessor::new("jobProcessor-0")),
    );

    for _ in 0..count {
        let id = MessageId::random();
        let input = WorkInput::new(i64::from(id.0));
        let outcome = if fire_and_forget {
            jobs.submit_async(id, input).await?;
            "Async Process Successful".to_string()
        } else {
            match jobs.submit_sync(id, input, timeout).await {
                Ok(result) => result.to_string(),
                Err(e) if e.is_timeout() => format!("Timeout: {e}"),
                Err(e) => e.to_string(),
            }
        };
        println!("{} [{id}] {outcome}", chrono::Local::now().format("%H:%M:%S%.3f"));
    }

    // Let background jobs finish before exiting.
    jobs.shutdown().await;
    Ok(())
}

async fn cmd_seed(config: &Config, tuning: &Tuning, key: &str, lines: u32) -> anyhow::Result<()> {
    let queue = connect_queue(config, tuning).await?;
    let blobs = FsBlobStore::new(config.blob_dir.clone());
    let id = external::seed(queue.as_ref(), &blobs, key, lines).await?;
    println!("Seeded {key} as message {id} on queue {}", config.queue_name);
    Ok(())
}
