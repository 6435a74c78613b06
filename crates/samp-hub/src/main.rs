// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SAMP Hub daemon
//!
//! Standalone hub serving the Standard Profile (lockfile + XML-RPC) and,
//! optionally, the Web Profile for browser clients.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (lockfile at $HOME/.samp, Web Profile on 21012)
//! samp-hub
//!
//! # Custom Web Profile port and config file
//! samp-hub --web-port 21013 --config hub.json
//!
//! # Standard Profile only
//! samp-hub --no-web
//! ```

use clap::Parser;
use samp::config::HubConfig;
use samp::hub::Hub;
use samp::profile::standard::StandardProfile;
use samp::profile::web::{AllowAll, WebProfile};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// SAMP hub - message broker for desktop astronomy applications
#[derive(Parser, Debug)]
#[command(name = "samp-hub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Web Profile port
    #[arg(long, default_value = "21012")]
    web_port: u16,

    /// Disable the Web Profile (Standard Profile only)
    #[arg(long)]
    no_web: bool,

    /// Lockfile path (default: $HOME/.samp)
    #[arg(short, long)]
    lockfile: Option<PathBuf>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load or assemble config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        HubConfig::from_file(&config_path)?
    } else {
        HubConfig {
            web_port: args.web_port,
            web_profile_enabled: !args.no_web,
            lockfile_path: args.lockfile,
            ..Default::default()
        }
    };
    config.validate()?;

    let web_enabled = config.web_profile_enabled;
    let hub = Arc::new(Hub::new(config));

    let standard = StandardProfile::start(hub.clone()).await?;
    let web = if web_enabled {
        Some(WebProfile::start(hub.clone(), Arc::new(AllowAll), Arc::new(AllowAll)).await?)
    } else {
        None
    };

    info!("+----------------------------------------------------+");
    info!("|  SAMP Hub v{:<39} |", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  XML-RPC:  {:39} |", standard.url);
    info!("|  Lockfile: {:39} |", standard.lock_path.display());
    info!(
        "|  Web:      {:39} |",
        web.as_ref().map_or("disabled".to_string(), |w| w.url.clone())
    );
    info!("+----------------------------------------------------+");

    // Shut down cleanly on Ctrl-C
    let signal_hub = hub.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping hub...");
        signal_hub.shutdown().await;
    });

    hub.stopped().await;
    info!("SAMP hub stopped");
    Ok(())
}
