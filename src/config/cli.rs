use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Trendline binary.
#[derive(Debug, Parser)]
#[command(
    name = "trendline",
    version,
    about = "Product recommendation scoring service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRENDLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the recommendation HTTP service.
    Serve(Box<ServeArgs>),
    /// Recompute every user's recommendations once and purge the cache namespace.
    #[command(name = "recompute")]
    Recompute(RecomputeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RecomputeArgs {
    #[command(flatten)]
    pub backends: BackendOverrides,
}

/// Overrides for the storage backends, shared by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct BackendOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the cache key namespace.
    #[arg(long = "cache-namespace", value_name = "NAMESPACE")]
    pub cache_namespace: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub backends: BackendOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the background task queue capacity.
    #[arg(long = "jobs-queue-capacity", value_name = "COUNT")]
    pub jobs_queue_capacity: Option<u32>,

    /// Override the number of background tasks run at once.
    #[arg(long = "jobs-task-concurrency", value_name = "COUNT")]
    pub jobs_task_concurrency: Option<u32>,

    /// Override the cron expression for scheduled recomputes.
    #[arg(long = "jobs-recompute-schedule", value_name = "CRON")]
    pub jobs_recompute_schedule: Option<String>,

    /// Override the default number of recommendations returned.
    #[arg(long = "recommendations-default-limit", value_name = "COUNT")]
    pub recommendations_default_limit: Option<u32>,
}
