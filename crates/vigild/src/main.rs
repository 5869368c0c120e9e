//! vigild: the vigil health monitor daemon.
//!
//! Polls a fixed list of HTTP, TCP and ping targets, debounces their health,
//! and sends rate-limited alerts to Telegram, a webhook, or the log.
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml [--dry-run]
//! vigild check --config /etc/vigil/vigil.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use vigil_alert::message;
use vigil_core::Settings;
use vigil_scheduler::PollScheduler;

#[derive(Parser)]
#[command(name = "vigild", about = "vigil health monitor daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the poll loop until interrupted.
    Run {
        /// Path to vigil.toml.
        #[arg(long, short, default_value = "vigil.toml")]
        config: PathBuf,

        /// Log notifications instead of delivering them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and print the watchlist.
    Check {
        #[arg(long, short, default_value = "vigil.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vigild=debug,vigil=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, dry_run } => run(config, dry_run).await,
        Command::Check { config } => check(config),
    }
}

fn load(config: &Path) -> anyhow::Result<Settings> {
    Settings::load(config).with_context(|| format!("invalid configuration {}", config.display()))
}

fn check(config: PathBuf) -> anyhow::Result<()> {
    let settings = load(&config)?;

    println!("{}", message::started(&settings.targets, settings.interval));
    println!();
    println!("{}", message::watchlist(&settings.targets));
    if let Some(reference) = &settings.reference {
        println!();
        println!("reference host: {}", reference.endpoint);
    }
    println!("state: {}", settings.state_path.display());
    Ok(())
}

async fn run(config: PathBuf, dry_run: bool) -> anyhow::Result<()> {
    let mut settings = load(&config)?;
    settings.dry_run |= dry_run;

    info!(
        targets = settings.targets.len(),
        interval_secs = settings.interval.as_secs(),
        max_workers = settings.max_workers,
        dry_run = settings.dry_run,
        "vigil daemon starting"
    );
    if settings.reference.is_none() {
        warn!("no reference host configured, global outage suppression disabled");
    }

    let mut scheduler = PollScheduler::from_settings(&settings)?;
    if settings.startup_summary {
        scheduler.announce_startup().await;
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_handle = tokio::spawn(scheduler.run(shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
    }
    let _ = shutdown_tx.send(true);

    poll_handle.await.context("poll loop task failed")?;

    info!("vigil daemon stopped");
    Ok(())
}
