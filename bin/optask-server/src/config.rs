//! Server configuration, loaded from environment variables at startup.
//!
//! A handful of settings can also be overridden on the command line; flags
//! win over the environment.

use std::time::Duration;

use clap::Parser;

/// Runtime configuration for optask-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://optask.db"`).
    pub database_url: String,

    /// Upper bound on pooled database connections.
    pub db_max_connections: u32,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for daily-rotated log files.  `None` logs to stdout only.
    pub log_dir: Option<String>,

    /// Number of solves allowed to run at the same time.
    pub worker_slots: usize,

    /// Cadence of the runner's cancellation checks and of progress events.
    pub poll_interval: Duration,

    /// Engine used when a submission does not name one.
    pub default_engine: String,

    /// Comma-separated list of allowed CORS origins. `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,
}

/// Command-line overrides.
#[derive(Debug, Default, Parser)]
#[command(name = "optask-server", version, about = "Asynchronous optimization task service")]
pub struct Cli {
    /// Address to listen on (overrides OPTASK_BIND).
    #[arg(long)]
    pub bind: Option<String>,

    /// Database URL (overrides OPTASK_DATABASE_URL).
    #[arg(long)]
    pub database_url: Option<String>,

    /// Concurrent solve limit (overrides OPTASK_WORKER_SLOTS).
    #[arg(long)]
    pub worker_slots: Option<usize>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("OPTASK_BIND", "0.0.0.0:3000"),
            database_url: env_or("OPTASK_DATABASE_URL", "sqlite://optask.db"),
            db_max_connections: parse_env("OPTASK_DB_MAX_CONNECTIONS", 8),
            log_level: env_or("OPTASK_LOG", "info"),
            log_json: env_flag("OPTASK_LOG_JSON", false),
            log_dir: std::env::var("OPTASK_LOG_DIR").ok().filter(|s| !s.is_empty()),
            worker_slots: parse_env("OPTASK_WORKER_SLOTS", 4),
            poll_interval: Duration::from_millis(parse_env("OPTASK_POLL_INTERVAL_MS", 1000)),
            default_engine: env_or("OPTASK_DEFAULT_ENGINE", optask_solver::MicrolpEngine::NAME),
            cors_allowed_origins: std::env::var("OPTASK_CORS_ORIGINS").ok(),
            enable_openapi: env_flag("OPTASK_ENABLE_OPENAPI", true),
        }
    }

    /// Environment configuration with command-line flags applied on top.
    pub fn load() -> Self {
        Self::from_env().with_cli(Cli::parse())
    }

    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(bind) = cli.bind {
            self.bind_address = bind;
        }
        if let Some(url) = cli.database_url {
            self.database_url = url;
        }
        if let Some(slots) = cli.worker_slots {
            self.worker_slots = slots;
        }
        self
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
