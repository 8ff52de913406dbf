//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::ServiceConfig;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    server: ServerInfo,
    dispatch: DispatchInfo,
    mapping: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    routes: Vec<RouteInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    targets: Vec<TargetInfo>,
    storage: String,
    ledger: String,
}

#[derive(Serialize)]
struct ServerInfo {
    bind: String,
    base_path: String,
}

#[derive(Serialize)]
struct DispatchInfo {
    workers: usize,
    queue_capacity: usize,
    shutdown_grace_secs: u64,
    release_message_types: Vec<String>,
}

#[derive(Serialize)]
struct RouteInfo {
    content_type: String,
    message_type: String,
    targets: Vec<String>,
}

#[derive(Serialize)]
struct TargetInfo {
    id: String,
    url: String,
    timeout_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn mapping_description(config: &ServiceConfig) -> String {
    match &config.mapping.remote_url {
        Some(url) => format!("remote {url}"),
        None => format!("static ({} routes)", config.mapping.routes.len()),
    }
}

fn ledger_description(config: &ServiceConfig) -> String {
    config
        .ledger
        .url
        .clone()
        .unwrap_or_else(|| "log only (accepts every transaction)".to_string())
}

fn build_config_info(config: &ServiceConfig, args: &InfoArgs) -> ConfigInfo {
    let routes = if args.routes {
        config
            .mapping
            .routes
            .iter()
            .map(|r| RouteInfo {
                content_type: r.content_type.clone(),
                message_type: r.message_type.clone(),
                targets: r.targets.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let targets = if args.targets {
        config
            .targets
            .iter()
            .map(|(id, t)| TargetInfo {
                id: id.clone(),
                url: t.url.clone(),
                timeout_ms: t.timeout_ms,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        server: ServerInfo {
            bind: config.server.bind.clone(),
            base_path: config.server.base_path.clone(),
        },
        dispatch: DispatchInfo {
            workers: config.dispatch.workers,
            queue_capacity: config.dispatch.queue_capacity,
            shutdown_grace_secs: config.dispatch.shutdown_grace_secs,
            release_message_types: config.dispatch.release_message_types.clone(),
        },
        mapping: mapping_description(config),
        routes,
        targets,
        storage: config.storage.base_path.clone(),
        ledger: ledger_description(config),
    }
}

fn print_config_info(config: &ServiceConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Outbound Dispatch Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🌐 Server");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Bind: {}", config.server.bind);
    println!("   └─ Endpoint: POST {}", config.server.base_path);

    let dispatch = &config.dispatch;
    println!("\n⚙️  Dispatch");
    println!(
        "   ├─ Workers: {} (queue {})",
        dispatch.workers, dispatch.queue_capacity
    );
    println!("   ├─ Shutdown grace: {}s", dispatch.shutdown_grace_secs);
    println!(
        "   └─ Release types: {}",
        dispatch.release_message_types.join(", ")
    );

    println!("\n🧭 Mapping: {}", mapping_description(config));
    if args.routes {
        for (i, route) in config.mapping.routes.iter().enumerate() {
            let prefix = if i == config.mapping.routes.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {} [{}] -> {}",
                prefix,
                route.message_type,
                route.content_type,
                route.targets.join(", ")
            );
        }
    }

    println!("\n📤 Targets ({})", config.targets.len());
    if args.targets {
        for (i, (id, target)) in config.targets.iter().enumerate() {
            let prefix = if i == config.targets.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {} ({}, {} ms)",
                prefix, id, target.url, target.timeout_ms
            );
        }
    }

    println!("\n🗄  Storage: {}", config.storage.base_path);
    println!("📒 Ledger: {}", ledger_description(config));
    println!();
}
