// src/main.rs

mod api;
mod cli;
mod config;
mod errors;
mod fanout;
mod guest_exec;
mod handlers;
mod inventory;
mod mcp;
mod policy;
mod proxmox_client;
mod render;
mod server;
mod tools;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use api::ProxmoxApi;
use cli::{Cli, Commands};
use config::{Config, LogFormat, LoggingConfig};
use fanout::FanOut;
use handlers::ClusterTools;
use mcp::Dispatcher;
use policy::{ElevationRequirement, PermissionGate};
use proxmox_client::ProxmoxClient;
use tools::ToolCatalogue;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = Cli::parse();

    let mut config = Config::load(cli_args.config.as_deref())?;
    cli_args.apply_overrides(&mut config);

    // stdout carries the stdio protocol, so logs always go to stderr
    init_tracing(&config.logging);
    match &config.source_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file found; using defaults and environment"),
    }

    match cli_args.command() {
        Commands::Serve => serve(config).await,
        Commands::Tools { json } => print_tools(&config, json),
        Commands::CheckConfig => check_config(&config),
    }
}

// RUST_LOG wins over --log-level, which already replaced [logging].level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

async fn serve(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    info!(
        "Starting proxmox-mcp {} against {}",
        env!("CARGO_PKG_VERSION"),
        config.proxmox.base_url()
    );
    debug!("Effective configuration: {:?}", config);

    let client = ProxmoxClient::new(&config.proxmox)?;
    let tools = ClusterTools::new(ProxmoxApi::new(Arc::new(client)), FanOut::from_config(&config.fanout));
    let catalogue = ToolCatalogue::build().context("Failed to build the tool catalogue")?;
    let gate = PermissionGate::from_config(&config);
    let dispatcher = Arc::new(Dispatcher::new(catalogue, gate, tools));

    server::serve(dispatcher, &config.server).await?;
    info!("proxmox-mcp shutting down.");
    Ok(())
}

fn print_tools(config: &Config, as_json: bool) -> Result<()> {
    let catalogue = ToolCatalogue::build().context("Failed to build the tool catalogue")?;
    if as_json {
        let tools: Vec<_> = catalogue.descriptors().collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "tools": tools }))?);
        return Ok(());
    }

    let gate = PermissionGate::new(config.permissions.allow_elevated);
    for tool in tools::Tool::ALL {
        let descriptor = catalogue.descriptors().find(|d| d.name == tool.name());
        let elevation = match tool.elevation() {
            ElevationRequirement::None => "open",
            ElevationRequirement::Required => "elevated",
            ElevationRequirement::Enhances => "enhanced",
        };
        let availability = if gate.allows(tool) { "available" } else { "refused" };
        println!(
            "{:<28} {:<9} {:<10} {}",
            tool.name(),
            elevation,
            availability,
            descriptor.map(|d| d.description.as_str()).unwrap_or_default()
        );
    }
    Ok(())
}

fn check_config(config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let gate = PermissionGate::new(config.permissions.allow_elevated);
    println!(
        "Configuration OK ({})",
        config
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults + environment".to_string())
    );
    println!("API endpoint: {}", config.proxmox.base_url());
    println!("Elevated tools: {}", if gate.is_elevated() { "enabled" } else { "disabled" });
    println!("{:#?}", config);
    Ok(())
}
