//! # msg-out CLI
//!
//! 出站金融报文分发服务的命令行入口。
//!
//! 提供：
//! - `serve`：启动 HTTP 接收端与后台分发池
//! - `validate` / `info`：离线检查配置
//! - 日志中每个分发任务都带有 `request_id` 与 `transaction_id`

mod cli;
mod commands;
mod error;
mod service;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::Layer;

use cli::{Cli, Commands, LogFormat};
use commands::{run_info, run_serve, run_validate};

/// HTTP stack crates kept at `warn` unless `RUST_LOG` says otherwise
const QUIET_DEPENDENCIES: [&str; 5] = ["hyper", "hyper_util", "h2", "reqwest", "rustls"];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = cli.command.name(),
        config = %cli.command.config_path().display(),
        "msg-out starting"
    );

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(command = cli.command.name(), error = %e, "Command failed");
    }

    result
}

/// Filter directives used when `RUST_LOG` is unset
fn default_directives(quiet: bool, verbose: u8) -> String {
    if quiet {
        return "warn".to_string();
    }
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    std::iter::once(level.to_string())
        .chain(QUIET_DEPENDENCIES.iter().map(|krate| format!("{krate}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if cli.quiet {
        EnvFilter::new(default_directives(true, 0))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(false, cli.verbose)))
    };

    // JSON lines carry the enclosing dispatch_job / accept_message span fields
    let fmt_layer = match cli.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
