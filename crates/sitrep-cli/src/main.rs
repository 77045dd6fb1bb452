//! Operator CLI: trigger workflows one-shot and run graph maintenance.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;

use sitrep_core::blob::RedisBlobStore;
use sitrep_core::{obs, Config};
use sitrep_flows::criticality::CriticalityWorkflow;
use sitrep_flows::cve_update::run_cve_update_workflow;
use sitrep_flows::easm::EasmWorkflow;
use sitrep_flows::maintenance::run_cleanup_workflow;
use sitrep_flows::nmap::topology::NmapTopologyWorkflow;
use sitrep_flows::nmap::NmapBasicWorkflow;
use sitrep_flows::slp::SlpEnrichmentWorkflow;
use sitrep_flows::IsimClient;
use sitrep_graph::GraphClient;

#[derive(Parser)]
#[command(name = "sitrep", about = "Cyber situational-awareness pipeline CLI")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "SITREP_CONFIG", default_value = "config/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the graph schema constraints and bootstrap default subnets.
    InitSchema,
    /// Run the EASM scan workflow once.
    Easm {
        /// Override the configured seed domains.
        #[arg(long)]
        domains: Vec<String>,
        /// Override the configured mode (fast or complete).
        #[arg(long)]
        mode: Option<String>,
    },
    /// Run the basic Nmap scan workflow once.
    NmapBasic {
        /// Override the configured targets.
        #[arg(long)]
        targets: Vec<String>,
    },
    /// Run the topology (traceroute) workflow once.
    NmapTopology {
        /// Override the configured targets.
        #[arg(long)]
        targets: Vec<String>,
    },
    /// Run the criticality workflow once.
    Criticality,
    /// Run the SLP enrichment workflow once.
    SlpEnrichment,
    /// Run a CVE sweep over all stored software versions.
    CveSweep,
    /// Reap lifecycle-closed edges past the retention window.
    Cleanup,
    /// Rebuild the IP/subnet PART_OF hierarchy.
    SyncHierarchy,
    /// Show aggregated asset information for IPs.
    IpInfo {
        /// Restrict the listing to one address.
        #[arg(long)]
        ip: Option<String>,
        #[arg(long, default_value_t = 500)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing(Level::INFO);

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("cannot load configuration")?;

    match cli.command {
        Command::InitSchema => {
            let graph = GraphClient::connect(&config.neo4j).await?;
            graph.init_schema().await?;
            println!("schema initialized");
        }
        Command::Easm { domains, mode } => {
            let mut scan_config = config.easm_scanner.clone();
            if !domains.is_empty() {
                scan_config.domains = domains;
            }
            if let Some(mode) = mode {
                scan_config.mode = mode;
            }
            let blob = RedisBlobStore::connect(&config.redis)?;
            let isim = IsimClient::new(&config.isim.url);
            let response = EasmWorkflow::new(&blob, &isim).run(&scan_config).await?;
            println!("{response}");
        }
        Command::NmapBasic { targets } => {
            let mut scan_config = config.nmap_basic.clone();
            if !targets.is_empty() {
                scan_config.targets = targets;
            }
            let isim = IsimClient::new(&config.isim.url);
            let response = NmapBasicWorkflow::new(&isim).run(&scan_config).await?;
            println!("{response}");
        }
        Command::NmapTopology { targets } => {
            let mut scan_config = config.nmap_topology.clone();
            if !targets.is_empty() {
                scan_config.targets = targets;
            }
            let isim = IsimClient::new(&config.isim.url);
            let response = NmapTopologyWorkflow::new(&isim).run(&scan_config).await?;
            println!("{response}");
        }
        Command::Criticality => {
            let isim = IsimClient::new(&config.isim.url);
            let response = CriticalityWorkflow::new(&isim).run().await?;
            println!("{response}");
        }
        Command::SlpEnrichment => {
            let isim = IsimClient::new(&config.isim.url);
            let response = SlpEnrichmentWorkflow::new(&isim, &config.slp_enrichment.x_api_key)
                .run()
                .await?;
            println!("{response}");
        }
        Command::CveSweep => {
            let response = run_cve_update_workflow(&config).await?;
            println!("{response}");
        }
        Command::Cleanup => {
            let response = run_cleanup_workflow(&config).await?;
            println!("{response}");
        }
        Command::SyncHierarchy => {
            let graph = GraphClient::connect(&config.neo4j).await?;
            graph.sync_ip_subnet_hierarchy().await?;
            println!("hierarchy synchronized");
        }
        Command::IpInfo { ip, limit, offset } => {
            let graph = GraphClient::connect(&config.neo4j).await?;
            let infos = graph.get_ip_asset_info(ip.as_deref(), limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
    }
    Ok(())
}
