//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest web harvester.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{load_config_with_hash, validate_harvest_config, Config, RotationMode};
use sumi_harvest::controller::{serve, ControllerClient, ControllerState};
use sumi_harvest::fetch::HttpFetcher;
use sumi_harvest::partition::{RangeDirection, RangePartitioner, RangeSource};
use sumi_harvest::pipeline::{Harvester, Pipeline};
use sumi_harvest::rotation::{
    lookup_real_address, IpAuthority, IpChanger, IpRotator, LocalSafety, Retention, TorNetwork,
};
use sumi_harvest::site::{SiteCapability, SiteRegistry};
use sumi_harvest::storage::{open_storage, share, HybridStorage, SharedStorage, Storage};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a distributed, rotation-aware web harvester
///
/// Sumi-Harvest collects item URLs from a site's listing pages, then the
/// properties of every item, sending all traffic through Tor and switching
/// the exit address after every batch. Several workers can split one site
/// through a shared controller.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A distributed, rotation-aware web harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, conflicts_with_all = ["stats", "serve_controller"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "serve_controller"])]
    stats: bool,

    /// Run the distributed controller instead of harvesting
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    serve_controller: bool,

    /// Only collect item URLs from listing pages
    #[arg(long, conflicts_with = "items_only")]
    list_only: bool,

    /// Only collect properties of already discovered items
    #[arg(long, conflicts_with = "list_only")]
    items_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config).context("Failed to load configuration")?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.serve_controller {
        handle_serve_controller(&config).await
    } else {
        let phases = Phases {
            lists: !cli.items_only,
            items: !cli.list_only,
        };
        handle_harvest(&config, phases).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Pipeline:");
    println!("  Workers: {}", config.pipeline.workers_count);
    println!("  Poll interval: {}ms", config.pipeline.poll_interval_ms);
    println!("  Request timeout: {}s", config.pipeline.request_timeout_secs);
    println!("  Transaction size: {}", config.pipeline.transaction_size);
    match &config.pipeline.retry_status_codes {
        Some(codes) => println!("  Retried statuses: {:?}", codes),
        None => println!("  Retried statuses: >= {}", config.pipeline.retry_from_status),
    }
    if !config.pipeline.rotate_status_codes.is_empty() {
        println!("  Retried through a new address: {:?}", config.pipeline.rotate_status_codes);
    }
    match config.pipeline.rotation {
        RotationMode::EveryBatch => println!("  Rotation: after every batch"),
        RotationMode::OnDemand => println!("  Rotation: on demand"),
    }

    println!("\nProxy:");
    println!(
        "  HTTP proxy: {}",
        config.proxy.http_proxy.as_deref().unwrap_or("(none)")
    );
    println!("  User agents: {}", config.proxy.user_agents.len());

    println!("\nTor:");
    println!("  Control port: {}:{}", config.tor.control_host, config.tor.control_port);
    println!("  Max attempts per rotation: {}", config.tor.new_ip_max_attempts);
    println!("  Control timeout: {}s", config.tor.control_timeout_secs);
    match Retention::from_threshold(config.tor.reuse_threshold) {
        Retention::Bounded(n) => println!("  Used addresses remembered: {}", n),
        Retention::RetainAll => println!("  Used addresses remembered: all"),
    }

    println!("\nSite:");
    println!("  Kind: {}", config.site.kind);
    println!("  Listing pages: {}{}N", config.site.base_url, config.site.list_url_template);
    println!("  Listing page count: {}", config.site.lists_count);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let site = SiteRegistry::with_builtin().build(&config.site)?;
    validate_harvest_config(config)?;
    match &config.controller.url {
        Some(url) => {
            println!("\n✓ Configuration is valid");
            println!("✓ Would ask the controller at {} for a listing range", url);
        }
        None => {
            let range = RangePartitioner::new(
                config.site.lists_count,
                config.partition.scrapers_count,
                RangeDirection::from_descending(config.partition.descending),
            )?
            .assignment_for(config.partition.worker_id)?;
            println!(
                "\nWorker {} of {}: range ({}, {})",
                config.partition.worker_id, config.partition.scrapers_count, range.start, range.end
            );
            println!("\n✓ Configuration is valid");
            println!("✓ Would harvest {} listing pages, starting with:", range.len());
            for url in site.generate_list_urls(range).take(3) {
                println!("    * {}", url);
            }
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(
        Path::new(&config.output.database_path),
        config.pipeline.transaction_size,
    )?;

    println!("Pending item URLs: {}", storage.count_pending()?);
    println!("Stored records:    {}", storage.count_records()?);

    Ok(())
}

/// Handles the --serve-controller mode
async fn handle_serve_controller(config: &Config) -> Result<()> {
    let real_address = lookup_real_address(&config.tor.ip_check_url)
        .await
        .context("Failed to look up the real address")?;
    tracing::info!("Real address: {}", real_address);

    let partitioner = RangePartitioner::new(
        config.site.lists_count,
        config.partition.scrapers_count,
        RangeDirection::from_descending(config.partition.descending),
    )?;
    let authority = Arc::new(IpAuthority::new(
        real_address,
        Retention::from_threshold(config.tor.reuse_threshold),
    ));
    let storage = share(open_storage(
        Path::new(&config.output.database_path),
        config.pipeline.transaction_size,
    )?);

    let listener = tokio::net::TcpListener::bind(&config.controller.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.controller.bind))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    };

    serve(listener, ControllerState::new(partitioner, authority, storage), shutdown).await?;
    Ok(())
}

/// Which harvesting phases to run
#[derive(Debug, Clone, Copy)]
struct Phases {
    lists: bool,
    items: bool,
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, phases: Phases) -> Result<()> {
    validate_harvest_config(config).context("Configuration cannot be used for harvesting")?;

    let timeout = Duration::from_secs(config.pipeline.request_timeout_secs);

    let controller = match &config.controller.url {
        Some(url) => {
            let client = ControllerClient::new(url, timeout)?;
            client
                .health()
                .await
                .with_context(|| format!("Controller at {} is not reachable", url))?;
            tracing::info!("Running as a distributed worker of {}", url);
            Some(client)
        }
        None => None,
    };

    let local = open_storage(
        Path::new(&config.output.database_path),
        config.pipeline.transaction_size,
    )?;
    let storage: SharedStorage = match &controller {
        Some(client) => share(HybridStorage::new(local, client.clone(), Handle::current())),
        None => share(local),
    };

    let real_address = lookup_real_address(&config.tor.ip_check_url)
        .await
        .context("Failed to look up the real address")?;
    tracing::info!("Real address: {}", real_address);

    let rotator = build_rotator(config, controller.clone(), real_address)?;
    let fetcher = Arc::new(HttpFetcher::new(&config.proxy, timeout)?);
    let site: Arc<dyn SiteCapability> = Arc::from(SiteRegistry::with_builtin().build(&config.site)?);

    let pipeline = Pipeline::new(&config.pipeline, fetcher, rotator, site, storage);
    let ranges = RangeSource::from_config(config, controller)?;
    let harvester = Harvester::new(pipeline, ranges);

    harvester.prepare().await?;

    if phases.lists {
        let summary = harvester.collect_list_urls().await?;
        tracing::info!("Listing pages processed: {}", summary.urls_processed);
    }
    if phases.items {
        let summary = harvester.collect_item_properties().await?;
        tracing::info!("Item pages processed: {}", summary.urls_processed);
    }

    tracing::info!("Harvest completed successfully");
    Ok(())
}

/// Builds the rotator: distributed workers ask the controller, others decide locally
fn build_rotator(
    config: &Config,
    controller: Option<ControllerClient>,
    real_address: IpAddr,
) -> Result<Arc<dyn IpRotator>> {
    let network = TorNetwork::new(&config.tor, &config.proxy)?;
    let attempts = config.tor.new_ip_max_attempts;
    let settle = Duration::from_millis(config.tor.renew_settle_ms);

    let rotator: Arc<dyn IpRotator> = match controller {
        Some(client) => Arc::new(
            IpChanger::new(network, client, attempts, settle).with_real_address(real_address),
        ),
        None => {
            let authority = Arc::new(IpAuthority::new(
                real_address,
                Retention::from_threshold(config.tor.reuse_threshold),
            ));
            Arc::new(IpChanger::new(network, LocalSafety::new(authority), attempts, settle))
        }
    };

    Ok(rotator)
}
