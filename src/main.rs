//! sitedesk - editing and preview backend for a static site.

#![allow(dead_code)]

mod actor;
mod build;
mod cli;
mod config;
mod content;
mod core;
mod logger;
mod preview;
mod rpc;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::Cli;
use config::SiteConfig;

fn main() {
    if let Err(e) = run() {
        logger::status_error("startup failed", &format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // Setup global Ctrl+C handler (before any blocking operations)
    let shutdown_rx = core::setup_shutdown_handler()?;

    let config = Arc::new(SiteConfig::load(&cli)?);
    log!("site"; "{} at {}", config.site_name(), config.root.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(
        actor::Coordinator::with_config(config)
            .with_shutdown_signal(shutdown_rx)
            .run(),
    )?;

    // The generator is gone by now; don't wait on stray blocking tasks.
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    Ok(())
}
