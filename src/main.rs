mod cache;
mod config;
mod metrics;
mod scheduler;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::metrics::MetricsRegistry;
use crate::scheduler::{PurgeScheduler, Sweeper, SWEEP_INTERVAL};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pkgcache", about = "Stale package eviction for a package cache")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/pkgcache/config.yaml")]
    config: String,

    /// Run a single sweep, print the resulting metrics and exit.
    #[arg(long)]
    once: bool,
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting pkgcache");

    // ---- Config ----
    let config = config::load_config(&cli.config).inspect_err(|e| {
        tracing::error!(error = ?e, "stopping because of invalid configuration");
    })?;

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Sweeper ----
    let sweeper = Sweeper::from_config(&config, metrics.clone())?;

    if cli.once {
        for report in sweeper.sweep_blocking().await? {
            let (packages, bytes) = metrics.metrics.cache_usage(&report.repo);
            tracing::info!(
                repo = %report.repo,
                purged_files = report.purged_files,
                issues = report.issues.len(),
                packages,
                bytes,
                "repo swept"
            );
        }
        let exposition = metrics.encode().context("failed to encode metrics")?;
        print!("{exposition}");
        return Ok(());
    }

    // ---- Scheduler ----
    let scheduler = PurgeScheduler::start(sweeper, SWEEP_INTERVAL);

    // ---- Await shutdown ----
    shutdown_signal().await;
    scheduler.stop().await;

    tracing::info!("pkgcache shut down cleanly");
    Ok(())
}
