//! Conductor Gateway Binary
//!
//! Standalone HTTP gateway in front of the Conductor safety layer.
//!
//! # Usage
//! ```bash
//! conductor-gateway [--config gateway.toml] [--port 8080] [--host 127.0.0.1] [--verbose]
//! ```

use anyhow::Context;
use clap::Parser;
use conductor_gateway::{env_loader, Gateway, GatewayConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Conductor Gateway - admission control, command sanitization and review arbitration
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Directory holding the projects
    #[arg(long)]
    projects_root: Option<PathBuf>,

    /// Disable the admission gate
    #[arg(long)]
    no_rate_limit: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    for path in env_loader::load_env() {
        tracing::info!(path = %path.display(), "environment file loaded");
    }

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(root) = args.projects_root {
        config = config.with_projects_root(root);
    }
    if args.no_rate_limit {
        config.rate_limit.enabled = false;
    }

    print_banner(&config);

    let gateway = Gateway::new(config);
    gateway.start().await?;

    Ok(())
}

fn print_banner(config: &GatewayConfig) {
    println!();
    println!("Conductor Gateway v{}", conductor_gateway::VERSION);
    println!("   └─ http://{}:{}", config.host, config.port);
    println!();
    println!("HTTP Endpoints");
    println!("   ├─ GET    /health                      Health check");
    println!("   ├─ GET    /status                      Gateway status");
    println!("   ├─ POST   /api/chat                    Sanitized agent command");
    println!("   ├─ POST   /api/chat/command            Sanitized slash command");
    println!("   ├─ POST   /api/review/resolve          Reviewer conflict resolution");
    println!("   ├─ POST   /api/projects/:name/deletion Request deletion token");
    println!("   └─ DELETE /api/projects/:name          Confirm deletion");
    println!();
    println!(
        "Admission gate: {}",
        if config.rate_limit.enabled {
            format!(
                "{}/min, {}/sec per client",
                config.rate_limit.requests_per_minute, config.rate_limit.requests_per_second
            )
        } else {
            "disabled".to_string()
        }
    );
    println!("Projects root:  {}", config.projects_root.display());
    println!();
}
