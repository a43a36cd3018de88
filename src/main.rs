//! Hackarena - Application Entry Point
//!
//! `serve` runs every service (gateway, judge workers, contest scheduler,
//! leaderboard flusher); `worker` runs queue workers only. Exit codes:
//! 0 success, 1 configuration error, 2 startup error, 130 on signal.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hackarena::{
    config::Config,
    db,
    events::{EventBus, EventSink, TokenVerifier},
    gateway,
    judge::JudgingEngine,
    leaderboard::LeaderboardController,
    lifecycle::ContestScheduler,
    queue::{JudgeQueue, QueueMetrics, WorkerPool},
    sandbox::SandboxExecutor,
    state::AppState,
};

#[derive(Parser)]
#[command(name = "hackarena", version, about = "Contest judging pipeline")]
struct Cli {
    /// Database connection string (overrides DATABASE_URL)
    #[arg(long, global = true)]
    db_url: Option<String>,

    /// Redis connection string (overrides REDIS_* variables)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Log level filter (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all services
    Serve {
        /// Gateway listen address, e.g. 0.0.0.0:8080
        #[arg(long)]
        listen: Option<String>,

        /// Initial judge worker count
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run queue workers only
    Worker {
        /// Initial judge worker count
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(url) = cli.redis_url {
        config.redis.url = url;
    }
    if let Some(level) = cli.log_level {
        config.server.log_level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("startup failed: {:?}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(command: Command, mut config: Config) -> anyhow::Result<ExitCode> {
    tracing::info!("Starting hackarena...");

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database).await?;
    db::healthcheck(&pool).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    // Compose the long-lived services once; everything downstream gets
    // them injected
    let shutdown = Arc::new(AtomicBool::new(false));
    let bus = Arc::new(EventBus::new());
    let events: Arc<dyn EventSink> = bus.clone();
    let metrics = Arc::new(QueueMetrics::new());
    let queue = JudgeQueue::new(redis_conn);
    let executor = Arc::new(SandboxExecutor::new(config.sandbox.clone()));
    let engine = JudgingEngine::new(executor, events.clone());
    let leaderboard = Arc::new(LeaderboardController::new(pool.clone(), events.clone()));

    match command {
        Command::Serve { listen, workers } => {
            if let Some(listen) = listen {
                config.server.listen_addr = listen;
            }
            let worker_count = workers.unwrap_or(config.queue.workers);

            let worker_pool = WorkerPool::new(
                pool.clone(),
                queue.clone(),
                engine,
                events.clone(),
                leaderboard.clone(),
                metrics.clone(),
                config.queue.max_attempts,
                shutdown.clone(),
            );
            let supervisor = worker_pool.start(worker_count);

            let flusher = tokio::spawn(leaderboard.clone().run_flusher(shutdown.clone()));

            let scheduler = Arc::new(ContestScheduler::new(
                pool.clone(),
                events.clone(),
                leaderboard.clone(),
                config.contest.grace_period_secs,
            ));
            let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown.clone()));

            let verifier = TokenVerifier::new(&config.jwt.secret);
            let listen_addr = config.server.listen_addr.clone();
            let state = AppState::new(
                pool,
                config,
                queue,
                bus,
                metrics,
                leaderboard,
                scheduler,
                verifier,
                worker_count,
            );
            let app = gateway::build_router(state);

            let listener = TcpListener::bind(&listen_addr).await?;
            tracing::info!("Gateway listening on http://{}", listen_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_signal())
                .await?;

            tracing::info!("Signal received; draining services...");
            shutdown.store(true, Ordering::SeqCst);
            let _ = supervisor.await;
            let _ = flusher.await;
            let _ = scheduler_task.await;

            Ok(ExitCode::from(130))
        }
        Command::Worker { workers } => {
            let worker_count = workers.unwrap_or(config.queue.workers);

            let worker_pool = WorkerPool::new(
                pool,
                queue,
                engine,
                events,
                leaderboard.clone(),
                metrics,
                config.queue.max_attempts,
                shutdown.clone(),
            );
            let supervisor = worker_pool.start(worker_count);
            let flusher = tokio::spawn(leaderboard.run_flusher(shutdown.clone()));

            wait_for_signal().await;

            tracing::info!("Signal received; draining workers...");
            shutdown.store(true, Ordering::SeqCst);
            let _ = supervisor.await;
            let _ = flusher.await;

            Ok(ExitCode::from(130))
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => {
                tracing::error!("failed to install SIGTERM handler");
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
