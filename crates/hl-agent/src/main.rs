//! hostlink Agent Daemon
//!
//! Reports host telemetry to the control plane and serves its terminal,
//! command and probe requests until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_agent::{AgentState, ConnectionManager};
use hl_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "hl-agent")]
#[command(about = "hostlink agent - reports telemetry to a control plane")]
#[command(version)]
struct Args {
    /// Control plane base URL
    /// Example: https://panel.example.com
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Authentication token
    #[arg(short, long)]
    token: Option<String>,

    /// Report interval in seconds (minimum 1)
    #[arg(short, long)]
    interval: Option<f64>,

    /// Reconnection attempts before falling back to HTTP reports
    #[arg(long)]
    max_retries: Option<u32>,

    /// Seconds between reconnection attempts
    #[arg(long)]
    reconnect_interval: Option<f64>,

    /// Reject remote commands
    #[arg(long)]
    disable_web_ssh: bool,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hostlink agent starting...");

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::debug!("No config file at {:?}, using defaults", config_path);
        AgentConfig::default()
    };

    apply_overrides(&mut config, &args)?;

    let state = Arc::new(AgentState::new(config).context("Invalid agent configuration")?);
    if state.config.disable_web_ssh {
        tracing::info!("Remote command execution is disabled");
    }

    let shutdown = CancellationToken::new();
    let manager = ConnectionManager::new(Arc::clone(&state));
    let report_loop = tokio::spawn(manager.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down...");

    shutdown.cancel();
    if let Err(e) = report_loop.await {
        tracing::error!("Report loop ended abnormally: {}", e);
    }
    state.terminals.shutdown_all().await;

    tracing::info!("Agent stopped");
    Ok(())
}

/// Apply command-line overrides on top of the file configuration
fn apply_overrides(config: &mut AgentConfig, args: &Args) -> Result<()> {
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(token) = &args.token {
        config.token = token.clone();
    }
    if let Some(interval) = args.interval {
        config.report_interval = seconds("--interval", interval)?;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(reconnect_interval) = args.reconnect_interval {
        config.reconnect_interval = seconds("--reconnect-interval", reconnect_interval)?;
    }
    if args.disable_web_ssh {
        config.disable_web_ssh = true;
    }
    Ok(())
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{} must be a non-negative number of seconds", flag))
}
