//! `serve` command implementation.

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use contracts::ServiceConfig;

use crate::cli::ServeArgs;
use crate::error::CliError;
use crate::service::Service;

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref bind) = args.bind {
        info!(bind = %bind, "Overriding listen address from CLI");
        config.server.bind = bind.clone();
    }
    if let Some(workers) = args.workers {
        info!(workers, "Overriding dispatch workers from CLI");
        config.dispatch.workers = workers;
    }
    config_loader::ConfigLoader::validate(&config).context("Invalid CLI override")?;

    info!(
        bind = %config.server.bind,
        base_path = %config.server.base_path,
        routes = config.mapping.routes.len(),
        targets = config.targets.len(),
        workers = config.dispatch.workers,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let service = Service::build(&config)?;
    let listener = gateway::bind(&config.server.bind).await?;

    info!("Starting service...");
    let snapshot = service.run(listener, shutdown_signal()).await?;

    info!(
        submitted = snapshot.submitted,
        released = snapshot.released,
        failed = snapshot.failed,
        "Service stopped"
    );
    println!("\n{snapshot}\n");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    warn!("Received shutdown signal, draining...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &ServiceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Server:");
    println!("  Bind: {}", config.server.bind);
    println!("  Base path: {}", config.server.base_path);
    println!("\nDispatch:");
    println!(
        "  Workers: {} (queue {})",
        config.dispatch.workers, config.dispatch.queue_capacity
    );
    println!(
        "  Release types: {}",
        config.dispatch.release_message_types.join(", ")
    );

    match &config.mapping.remote_url {
        Some(url) => println!("\nMapping: remote ({url})"),
        None => println!("\nMapping: {} static routes", config.mapping.routes.len()),
    }

    if !config.targets.is_empty() {
        println!("\nTargets ({}):", config.targets.len());
        for (id, target) in &config.targets {
            println!("  - {} -> {}", id, target.url);
        }
    }

    println!();
}
