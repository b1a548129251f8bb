//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Analytics CLI - replay events through the telemetry pipeline
#[derive(Parser, Debug)]
#[command(
    name = "analytics-cli",
    author,
    version,
    about = "Telemetry event pipeline driver",
    long_about = "Loads a client configuration, replays a JSON-lines event file through \n\
                  source middleware, batching and per-destination delivery, and prints \n\
                  a delivery summary."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "ANALYTICS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "ANALYTICS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay an event file through the pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "analytics.toml", env = "ANALYTICS_CONFIG")]
    pub config: PathBuf,

    /// JSON-lines file with one event per line
    #[arg(short, long, env = "ANALYTICS_EVENTS")]
    pub events: PathBuf,

    /// Drop track events with this name in a source middleware (repeatable)
    #[arg(long = "drop-event", value_name = "EVENT")]
    pub drop_events: Vec<String>,

    /// Override flush_queue_size from configuration
    #[arg(long, env = "ANALYTICS_FLUSH_QUEUE_SIZE")]
    pub flush_queue_size: Option<usize>,

    /// Replay timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "ANALYTICS_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without replaying
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "ANALYTICS_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "analytics.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "analytics.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show destination configuration
    #[arg(long)]
    pub destinations: bool,

    /// Show tracking plan rules
    #[arg(long)]
    pub tracking_plan: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
