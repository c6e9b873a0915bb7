//! Command-line front end for PhotoSync.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photosync_client::{HttpRemoteStore, RemoteObjectStore};
use photosync_core::TriggerKind;
use photosync_core::config::AppConfig;
use photosync_core::session::STATUS_NOT_CONFIGURED;
use photosync_sync::{
    DirectorySource, ExecutionPlatform, ExecutionScheduler, HttpTransport, LibraryWatcher,
    TimedPlatform, TransferEngine, UploadOrchestrator, metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "photosyncctl")]
#[command(about = "Back up a photo library to a content-addressed object store")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(
        long,
        global = true,
        env = "PHOTOSYNC_CONFIG",
        default_value = "photosync.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass
    Sync {
        /// Maximum number of newest items to consider (default: per trigger)
        #[arg(long)]
        limit: Option<usize>,
        /// Trigger kind to run as
        #[arg(long, default_value = "manual")]
        trigger: TriggerKind,
        /// Stay until every queued upload has finished
        #[arg(long, default_value_t = false)]
        wait: bool,
        /// Give up waiting after this many seconds and cancel the remaining uploads
        #[arg(long, requires = "wait")]
        wait_timeout: Option<u64>,
        /// Print Prometheus metrics after the run
        #[arg(long, default_value_t = false)]
        print_metrics: bool,
    },
    /// Serve timed execution windows until interrupted
    Daemon,
    /// Show local state: uploaded items and pending transfers
    Status {
        /// Print pending jobs as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List the most recent uploads on the remote
    Latest {
        /// Number of items (1-20)
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Check remote API health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, command } = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::load_config(&config)?;

    match command {
        Commands::Sync {
            limit,
            trigger,
            wait,
            wait_timeout,
            print_metrics,
        } => {
            handle_sync_command(
                &config,
                limit,
                trigger,
                wait,
                wait_timeout.map(Duration::from_secs),
                print_metrics,
            )
            .await
        }
        Commands::Daemon => handle_daemon_command(&config).await,
        Commands::Status { json } => handle_status_command(&config, json).await,
        Commands::Latest { limit } => handle_latest_command(&config, limit).await,
        Commands::Health => handle_health_command(&config).await,
    }
}

/// Everything a sync needs, wired from configuration.
struct Pipeline {
    orchestrator: Arc<UploadOrchestrator>,
    engine: TransferEngine,
    listener: JoinHandle<()>,
}

async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let (index, jobs) = photosync_storage::from_config(&config.state)
        .await
        .context("failed to open local state")?;
    tracing::info!(state_dir = %config.state.dir.display(), "local state opened");

    let remote = HttpRemoteStore::from_config(&config.remote)
        .context("invalid remote configuration")?
        .map(|client| Arc::new(client) as Arc<dyn RemoteObjectStore>);
    if remote.is_none() {
        tracing::warn!("no remote API base URL configured");
    }

    let transport = HttpTransport::new(config.remote.timeout())
        .context("failed to build upload transport")?;
    let engine = TransferEngine::new(jobs, Arc::new(transport), config.transfer.clone());
    let orchestrator = Arc::new(UploadOrchestrator::new(
        remote,
        Arc::new(DirectorySource::new(&config.source.path)),
        index,
        engine.clone(),
        config.state.payloads_dir(),
        config.sync.clone(),
    ));

    // Subscribe before resuming so completions of resumed jobs mark the index.
    let listener = orchestrator.spawn_completion_listener();
    engine
        .start()
        .await
        .context("failed to resume pending transfers")?;

    Ok(Pipeline {
        orchestrator,
        engine,
        listener,
    })
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            token.cancel();
        }
    });
}

async fn handle_sync_command(
    config: &AppConfig,
    limit: Option<usize>,
    trigger: TriggerKind,
    wait: bool,
    wait_timeout: Option<Duration>,
    print_metrics: bool,
) -> Result<()> {
    let Pipeline {
        orchestrator,
        engine,
        listener,
    } = build_pipeline(config).await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let limit = limit.unwrap_or_else(|| config.sync.limit_for(trigger));
    let session = orchestrator.run(limit, trigger, &cancel).await;

    println!("{}", session.status);
    if session.aborted() {
        anyhow::bail!("{}", session.status);
    }
    println!(
        "  queued: {}  already stored: {}  failed: {}",
        session.queued, session.already_exists, session.failed
    );

    let state = orchestrator.state().clone();
    if wait {
        if engine.in_flight() > 0 {
            println!("Waiting for {} upload(s)...", engine.in_flight());
            wait_for_transfers(&engine, wait_timeout, &cancel).await;
        }

        // Dropping the last engine handle closes the event channel; the
        // listener drains what is left and exits.
        drop(orchestrator);
        drop(engine);
        if let Err(e) = listener.await {
            tracing::warn!(error = %e, "completion listener failed");
        }
        let session = state.snapshot();
        println!("Uploaded {} of {} queued item(s)", session.uploaded, session.queued);
    } else if engine.in_flight() > 0 {
        println!(
            "{} upload(s) pending; they resume on the next run",
            engine.in_flight()
        );
    }

    if print_metrics {
        print!(
            "{}",
            metrics::gather_text().context("failed to encode metrics")?
        );
    }
    Ok(())
}

async fn wait_for_transfers(
    engine: &TransferEngine,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        () = engine.wait_drained() => return,
        () = deadline => tracing::warn!("wait timeout reached, cancelling remaining uploads"),
        () = cancel.cancelled() => tracing::warn!("interrupted, cancelling remaining uploads"),
    }
    engine.expire().await;
    engine.wait_drained().await;
}

async fn handle_daemon_command(config: &AppConfig) -> Result<()> {
    let Pipeline {
        orchestrator,
        engine,
        listener,
    } = build_pipeline(config).await?;

    let platform = Arc::new(TimedPlatform::new(config.scheduler.clone()));
    let scheduler = ExecutionScheduler::new(
        platform.clone(),
        orchestrator,
        config.sync.clone(),
        config.scheduler.expiry_grace(),
    );

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let _watcher = if config.source.watch {
        match LibraryWatcher::start(
            &config.source.path,
            platform.clone(),
            config.source.watch_debounce(),
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(
                    path = %config.source.path.display(),
                    error = %e,
                    "cannot watch library, relying on timed windows"
                );
                None
            }
        }
    } else {
        None
    };

    tracing::info!("PhotoSync daemon v{}", env!("CARGO_PKG_VERSION"));
    platform.request_window(TriggerKind::Manual).await;
    scheduler.run(shutdown).await;

    let pending = engine.in_flight();
    if pending > 0 {
        tracing::info!(pending, "pending uploads resume on next start");
    }
    listener.abort();
    Ok(())
}

async fn handle_status_command(config: &AppConfig, json: bool) -> Result<()> {
    let (index, jobs) = photosync_storage::from_config(&config.state)
        .await
        .context("failed to open local state")?;
    let pending = jobs.list_pending().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    println!("State directory: {}", config.state.dir.display());
    println!(
        "Remote API: {}",
        config.remote.base_url().unwrap_or(STATUS_NOT_CONFIGURED)
    );
    println!("Uploaded items: {}", index.len().await);
    println!("Pending transfers: {}", pending.len());
    for job in &pending {
        print!(
            "  {} {:?} attempts={} {}",
            job.id, job.state, job.attempts, job.key
        );
        match &job.last_error {
            Some(error) => println!(" last_error={error}"),
            None => println!(),
        }
    }
    Ok(())
}

fn require_remote(config: &AppConfig) -> Result<HttpRemoteStore> {
    HttpRemoteStore::from_config(&config.remote)
        .context("invalid remote configuration")?
        .ok_or_else(|| anyhow::anyhow!(STATUS_NOT_CONFIGURED))
}

async fn handle_latest_command(config: &AppConfig, limit: u32) -> Result<()> {
    let remote = require_remote(config)?;
    let items = remote.list_latest(limit).await?;

    if items.is_empty() {
        println!("No uploads yet");
        return Ok(());
    }
    for item in items {
        println!(
            "{}  {}  {}",
            item.last_modified.as_deref().unwrap_or("-"),
            item.size.map_or_else(|| "-".to_string(), |size| size.to_string()),
            item.key
        );
        println!("    {}", item.url);
    }
    Ok(())
}

async fn handle_health_command(config: &AppConfig) -> Result<()> {
    let remote = require_remote(config)?;
    let healthy = remote
        .health()
        .await
        .with_context(|| format!("health check against {} failed", remote.base_url()))?;

    if !healthy {
        anyhow::bail!("remote API at {} reports unhealthy", remote.base_url());
    }
    println!("Remote API at {} is healthy", remote.base_url());
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
