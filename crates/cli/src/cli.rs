//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Outbound message dispatch service
#[derive(Parser, Debug)]
#[command(
    name = "msg-out",
    author,
    version,
    about = "Outbound financial message dispatch service",
    long_about = "Accepts outbound financial messages over HTTP, validates them, and fans \n\
                  them out to the downstream targets mapped for their message type. \n\
                  Successful deliveries release the transaction; failures are compensated."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MSG_OUT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MSG_OUT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service and dispatch pool
    Serve(ServeArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serve(_) => "serve",
            Self::Validate(_) => "validate",
            Self::Info(_) => "info",
        }
    }

    /// Configuration file the command reads
    pub fn config_path(&self) -> &Path {
        match self {
            Self::Serve(args) => &args.config,
            Self::Validate(args) => &args.config,
            Self::Info(args) => &args.config,
        }
    }
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config/msg-out.toml", env = "MSG_OUT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address from configuration
    #[arg(long, env = "MSG_OUT_BIND")]
    pub bind: Option<String>,

    /// Override the number of dispatch workers
    #[arg(long, env = "MSG_OUT_WORKERS")]
    pub workers: Option<usize>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "MSG_OUT_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without serving
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config/msg-out.toml", env = "MSG_OUT_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/msg-out.toml", env = "MSG_OUT_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the route table
    #[arg(long)]
    pub routes: bool,

    /// Show target endpoints
    #[arg(long)]
    pub targets: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
