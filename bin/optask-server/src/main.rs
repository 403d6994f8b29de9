//! optask-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables and flags.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database, run pending migrations and finish tasks a
//!    previous process left running.
//! 4. Register solver engines and start the task runtime.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod entities;
mod error;
mod middleware;
mod routes;
mod runtime;
mod schemas;
mod state;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use optask_solver::EngineRegistry;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Config;
use crate::entities::{SqliteStore, TaskStore};
use crate::runtime::{ProgressPublisher, TaskRunner, Ticker};
use crate::state::AppState;

const RESTART_REASON: &str = "interrupted by server restart";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::load();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Dropping the guard flushes the file writer, so it lives until `main` returns.
    let _log_guard = init_tracing(&cfg);

    info!(version = env!("CARGO_PKG_VERSION"), "optask-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url, cfg.db_max_connections)
        .await
        .with_context(|| format!("failed to open database {}", cfg.database_url))?;
    info!(database_url = %cfg.database_url, "database ready");

    let interrupted = store.interrupt_unfinished_tasks(RESTART_REASON).await?;
    if interrupted > 0 {
        warn!(count = interrupted, "finished tasks left running by a previous process");
    }

    // ── 4. Task runtime ────────────────────────────────────────────────────────
    let engines = EngineRegistry::with_builtin(cfg.default_engine.clone());
    if engines.get(&cfg.default_engine).is_none() {
        anyhow::bail!(
            "default engine '{}' is not available (known: {})",
            cfg.default_engine,
            engines.names().join(", ")
        );
    }
    info!(engines = ?engines.names(), default = %cfg.default_engine, "solver engines registered");

    let store = Arc::new(store);
    let ticker = Ticker::new(cfg.poll_interval);
    let runner = TaskRunner::new(
        Arc::clone(&store),
        Arc::new(engines),
        cfg.worker_slots,
        ticker,
    );
    let publisher = ProgressPublisher::new(Arc::clone(&store), ticker);
    info!(
        worker_slots = cfg.worker_slots,
        poll_interval_ms = ticker.period().as_millis(),
        "task runtime ready"
    );

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store: Arc::clone(&store),
        runner,
        publisher,
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(state);
    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tasks still running are finished as interrupted on the next start.
    store.close().await;
    info!("optask-server stopped");
    Ok(())
}

/// Install the global subscriber: stdout, plus a daily-rotated file when
/// `OPTASK_LOG_DIR` is set.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: OPTASK_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let stdout_layer = if cfg.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    };

    let (file_layer, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "optask-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
