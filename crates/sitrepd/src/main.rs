//! Worker daemon.
//!
//! Loads the configuration, waits for the graph store, applies the schema,
//! registers the periodic workflows on their task queues, and drains
//! everything on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn, Level};

use sitrep_core::error::Error;
use sitrep_core::{obs, Config};
use sitrep_flows::cve_update::run_cve_update_workflow;
use sitrep_flows::maintenance::run_cleanup_workflow;
use sitrep_flows::slp::SlpEnrichmentWorkflow;
use sitrep_flows::{IsimClient, Scheduler, ShutdownSignal};
use sitrep_graph::GraphClient;

const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

const CVE_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
const SLP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser)]
#[command(name = "sitrepd", about = "Situational-awareness pipeline worker daemon")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "SITREP_CONFIG", default_value = "config/config.yaml")]
    config: PathBuf,
}

async fn connect_graph_with_retry(config: &Config) -> anyhow::Result<GraphClient> {
    let mut attempt = 1;
    loop {
        match GraphClient::connect(&config.neo4j).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, error = %e, "graph store not reachable yet, retrying");
                attempt += 1;
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e).context("could not connect to the graph store"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing(Level::INFO);

    let args = Args::parse();
    let config = Arc::new(Config::load(&args.config)?);
    if config.neo4j.password.is_empty() {
        return Err(Error::BadInput(
            "neo4j password is not set (neo4j.password or NEO4J_PASSWORD)".into(),
        )
        .into());
    }

    let graph = connect_graph_with_retry(&config).await?;
    graph.init_schema().await?;
    drop(graph);

    let (shutdown_handle, shutdown_signal) = ShutdownSignal::pair();
    let mut scheduler = Scheduler::new(shutdown_signal);

    let cve_config = config.clone();
    register(
        &mut scheduler,
        "cve-update-scheduled-workflow",
        &config.temporal.cve_connector_task_queue,
        CVE_SWEEP_INTERVAL,
        move || {
            let config = cve_config.clone();
            async move { run_cve_update_workflow(&config).await }
        },
    );

    let slp_config = config.clone();
    register(
        &mut scheduler,
        "slp-enrichment-schedule-id",
        &config.temporal.slp_enrichment_task_queue,
        SLP_INTERVAL,
        move || {
            let config = slp_config.clone();
            async move {
                let isim = IsimClient::new(&config.isim.url);
                SlpEnrichmentWorkflow::new(&isim, &config.slp_enrichment.x_api_key)
                    .run()
                    .await
            }
        },
    );

    let cleanup_config = config.clone();
    register(
        &mut scheduler,
        "retention-cleanup-schedule",
        &config.temporal.csa_task_queue,
        CLEANUP_INTERVAL,
        move || {
            let config = cleanup_config.clone();
            async move { run_cleanup_workflow(&config).await }
        },
    );

    tokio::spawn(async move {
        wait_for_termination().await;
        info!("received shutdown signal, initiating graceful shutdown");
        shutdown_handle.shutdown();
    });

    info!("sitrepd started");
    scheduler.run_until_shutdown().await;
    info!("worker stopped gracefully");
    Ok(())
}

fn register<F, Fut>(
    scheduler: &mut Scheduler,
    schedule_id: &str,
    task_queue: &str,
    interval: Duration,
    workflow: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = sitrep_core::Result<String>> + Send,
{
    match scheduler.create_schedule(schedule_id, task_queue, interval, workflow) {
        Ok(()) => {}
        Err(Error::ScheduleAlreadyRunning(id)) => info!(schedule = %id, "schedule already running"),
        Err(e) => error!(schedule = %schedule_id, error = %e, "schedule creation failed"),
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
