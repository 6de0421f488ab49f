//! gpugridd — the GpuGrid daemon.
//!
//! Assembles the GpuGrid subsystems in one process:
//! - Scheduler + resource pool
//! - Health monitor
//! - Autoscaler
//! - Event stream logger
//!
//! # Usage
//!
//! ```text
//! gpugridd run --config /etc/gpugrid/gpugrid.toml
//! gpugridd check --config /etc/gpugrid/gpugrid.toml
//! ```

mod inventory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use gpugrid_autoscale::{AutoScaler, ScaleDecision, ScaleFuture};
use gpugrid_core::GridConfig;
use gpugrid_health::{HealthMonitor, SimulatedMetrics};
use gpugrid_scheduler::{LoadSummary, Scheduler};
use gpugrid_state::EventBus;

#[derive(Parser)]
#[command(name = "gpugridd", about = "GpuGrid compute scheduler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler with its health and autoscaling loops.
    Run {
        /// Path to gpugrid.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Seed for round-robin placement and simulated metrics.
        #[arg(long)]
        seed: Option<u64>,

        /// Feed the health monitor random metrics instead of reported ones.
        #[arg(long)]
        simulate_metrics: bool,
    },
    /// Validate a config file and print the resolved settings.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            log_json,
            seed,
            simulate_metrics,
        } => {
            init_tracing(log_json);
            run(config.as_deref(), seed, simulate_metrics).await
        }
        Command::Check { config } => {
            init_tracing(false);
            check(&config)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gpugridd=debug,gpugrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GridConfig> {
    match path {
        Some(path) => GridConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(GridConfig::default()),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(path))?;
    let clusters = inventory::build_all(&config.clusters)?;
    let nodes: usize = clusters.iter().map(|c| c.nodes.len()).sum();
    info!(
        strategy = %config.scheduler.strategy,
        clusters = clusters.len(),
        nodes,
        "config ok"
    );
    println!("{}", config.to_toml_string()?);
    Ok(())
}

async fn run(config_path: Option<&Path>, seed: Option<u64>, simulate_metrics: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!(strategy = %config.scheduler.strategy, "GpuGrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let events = EventBus::new(config.scheduler.event_buffer);
    let event_rx = events.subscribe();

    let mut scheduler = Scheduler::new(&config, events)?;
    if let Some(seed) = seed {
        scheduler = scheduler.with_seed(seed);
    }
    let scheduler = Arc::new(scheduler);
    info!("scheduler initialized");

    for cluster in inventory::build_all(&config.clusters)? {
        let id = cluster.id.clone();
        scheduler
            .register_cluster(cluster)
            .await
            .with_context(|| format!("registering cluster '{id}'"))?;
    }

    let mut health = HealthMonitor::new(scheduler.clone(), config.health.clone());
    if simulate_metrics {
        let source = match seed {
            Some(seed) => SimulatedMetrics::new(seed),
            None => SimulatedMetrics::from_entropy(),
        };
        health = health.with_source(Arc::new(source));
        info!("health monitor using simulated metrics");
    }
    let health = Arc::new(health);

    let autoscaler = Arc::new(
        AutoScaler::new(scheduler.clone(), config.autoscale.clone()).with_scale_fn(Arc::new(
            |decision: ScaleDecision, load: LoadSummary| {
                Box::pin(async move {
                    // Provisioning is out of process; record what was asked for.
                    info!(?decision, nodes = load.node_count, "provisioning request");
                    Ok(())
                }) as ScaleFuture
            },
        )),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let events_handle = tokio::spawn(log_events(event_rx, shutdown_rx.clone()));
    let health_handle = tokio::spawn(health.run(shutdown_rx.clone()));
    let autoscale_handle = tokio::spawn(autoscaler.run(shutdown_rx));

    let stats = scheduler.stats().await;
    info!(
        clusters = stats.total_clusters,
        nodes = stats.total_nodes,
        gpus = stats.total_capacity.gpu_count,
        "GpuGrid daemon ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = health_handle.await;
    let _ = autoscale_handle.await;
    let _ = events_handle.await;

    let stats = scheduler.stats().await;
    info!(
        queued = stats.queued_count,
        running = stats.running_count,
        completed = stats.completed_count,
        "GpuGrid daemon stopped"
    );
    Ok(())
}

/// Log every lifecycle event as a JSON payload.
async fn log_events(mut rx: broadcast::Receiver<gpugrid_state::GridEvent>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => info!(event = event.name(), %payload, "grid event"),
                    Err(e) => warn!(event = event.name(), error = %e, "failed to encode event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => {
                debug!("event logger shutting down");
                break;
            }
        }
    }
}
