//! Binary entry wiring: argument parsing, logging setup, and the
//! config → registry → server bootstrap.

use anyhow::{bail, Context};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::fs::RealFileSystem;
use crate::registry;
use crate::router::HandlerRegistry;
use crate::server::HttpServer;

#[derive(Parser)]
#[command(name = "portico")]
#[command(about = "Config-driven HTTP/1.1 application server", long_about = None)]
pub struct Cli {
    /// Path to the server config file
    pub config: PathBuf,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

/// Parse args, build the routing table, and serve until SIGINT/SIGTERM.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("invalid config file {}", cli.config.display()))?;

    let port = match config.port() {
        Some(value) => match value.parse::<u32>() {
            Ok(port @ 1..=65535) => port as u16,
            _ => bail!("port out of range (1-65535): {value}"),
        },
        None => bail!("config has no `port` directive"),
    };

    registry::register_builtin_handlers();
    let table = HandlerRegistry::from_config(&config, Arc::new(RealFileSystem))
        .context("failed to build routing table")?;

    // One scheduler worker per CPU, minimum two, so a blocking handler
    // cannot starve unrelated connections.
    may::config().set_workers(std::cmp::max(2, num_cpus::get()));

    let handle = HttpServer::new(Arc::new(table), port).start()?;
    info!(port, "server started");

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handler")?;
    signals.forever().next();

    info!("shutting down");
    handle.stop();
    Ok(())
}
