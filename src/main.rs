use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dumpsync::auth::{AuthService, HttpVerifier, TokenStore};
use dumpsync::config::AppConfig;
use dumpsync::reconcile::FixedDelay;
use dumpsync::web::{AppState, build_router};
use dumpsync::{
    ConnectionPool, DumpUpdateTask, FailurePolicy, LookupService, MemoryManager, MemoryStore,
    ReconcileOptions, Reconciler, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dumpsync")]
#[command(about = "Reconciles the daily world dumps into the store and serves lookups")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one update over both dumps and exit
    Reconcile {
        /// Attempts per record, including the first
        #[arg(long, default_value_t = 1)]
        attempts: u32,
        /// Skip records that keep failing instead of aborting the pass
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Serve the web API and run the update on a schedule
    Serve,
}

/// Nation id lookups may lag a rename or a new founding by this much.
const NATION_ID_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::Reconcile {
            attempts,
            continue_on_error,
        } => {
            let on_failure = if continue_on_error {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            };
            let options = ReconcileOptions::default()
                .throttle(FixedDelay::new(config.throttle))
                .retry(RetryPolicy::attempts(attempts, Duration::from_millis(250)))
                .on_record_failure(on_failure);
            run_reconcile(&config, options).await
        }
        Command::Serve => run_serve(&config).await,
    }
}

async fn open_store(config: &AppConfig) -> Result<MemoryStore> {
    match &config.state_file {
        Some(path) => MemoryStore::open(path)
            .await
            .with_context(|| format!("failed to open store state {}", path.display())),
        None => Ok(MemoryStore::new()),
    }
}

fn build_task(
    config: &AppConfig,
    store: &MemoryStore,
    pool: Arc<ConnectionPool<MemoryManager>>,
    options: ReconcileOptions,
    cancel: CancellationToken,
) -> DumpUpdateTask<MemoryManager> {
    let reconciler = Reconciler::new(pool)
        .with_options(options)
        .with_cancellation(cancel);
    let task = DumpUpdateTask::new(
        Arc::new(reconciler),
        &config.nations_dump,
        &config.regions_dump,
    );
    match &config.state_file {
        Some(path) => task.with_checkpoint(store.clone(), path),
        None => task,
    }
}

async fn run_reconcile(config: &AppConfig, options: ReconcileOptions) -> Result<()> {
    let store = open_store(config).await?;
    let pool = Arc::new(
        ConnectionPool::new(config.pool_config()?, MemoryManager::new(store.clone()))
            .await
            .context("failed to initialize connection pool")?,
    );

    let cancel = CancellationToken::new();
    let task = build_task(config, &store, pool, options, cancel.clone());

    let report = tokio::select! {
        report = task.run_once() => report.context("dump update failed")?,
        _ = shutdown_signal() => {
            cancel.cancel();
            anyhow::bail!("dump update interrupted");
        }
    };

    info!(
        nations = %report.nations,
        regions = %report.regions,
        "dump update finished"
    );
    Ok(())
}

async fn run_serve(config: &AppConfig) -> Result<()> {
    let store = open_store(config).await?;
    let pool = Arc::new(
        ConnectionPool::new(config.pool_config()?, MemoryManager::new(store.clone()))
            .await
            .context("failed to initialize connection pool")?,
    );

    let cancel = CancellationToken::new();
    let options = ReconcileOptions::default().throttle(FixedDelay::new(config.throttle));
    let task = Arc::new(build_task(
        config,
        &store,
        Arc::clone(&pool),
        options,
        cancel.clone(),
    ));
    let scheduler = tokio::spawn(task.run_every(config.update_interval, cancel.clone()));

    let lookups = Arc::new(LookupService::new(
        pool,
        config.cache_capacity,
        NATION_ID_TTL,
    ));
    let verifier = HttpVerifier::new(config.verify_url.clone())
        .context("failed to build verification client")?;
    let auth = Arc::new(AuthService::new(
        Arc::clone(&lookups),
        TokenStore::new(),
        Arc::new(verifier),
    ));

    let app = build_router(AppState::new(lookups, auth));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        update_interval_secs = config.update_interval.as_secs(),
        "dumpsync started"
    );

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(err) = scheduler.await {
        error!(error = %err, "dump update scheduler panicked");
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dumpsync=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
