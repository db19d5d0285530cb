//! Registry-Harvester main entry point
//!
//! This is the command-line interface for the physician-registry harvester.

use anyhow::{Context, Result};
use clap::Parser;
use registry_harvester::config::{load_config_with_hash, validate, Config};
use registry_harvester::harvester::{run_harvest, InterruptFlag};
use registry_harvester::output::{print_checkpoint, print_report, report, CsvMerger};
use registry_harvester::storage::open_store;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Registry-Harvester: a resilient physician-registry harvester
///
/// Drives a browser through the paginated search results of a public
/// registry, one region at a time, and writes the extracted records to CSV.
/// Interrupted or blocked sessions leave a checkpoint and resume from it.
#[derive(Parser, Debug)]
#[command(name = "registry-harvester")]
#[command(version)]
#[command(about = "A resilient physician-registry harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Region code to harvest (overrides the configuration)
    #[arg(long, value_name = "UF")]
    region: Option<String>,

    /// Stop after this many completed pages (overrides the configuration)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the region's checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start at page 1, clearing any checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate the configuration and print it without harvesting
    #[arg(long, conflicts_with_all = ["status", "merge"])]
    dry_run: bool,

    /// Show the region's checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "merge"])]
    status: bool,

    /// Merge the exported CSV files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    merge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if let Some(region) = &cli.region {
        config.harvest.region = region.to_uppercase();
    }
    if let Some(max_pages) = cli.max_pages {
        config.harvest.max_pages = Some(max_pages);
    }
    validate(&config).context("invalid command-line override")?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.merge {
        handle_merge(&config)?;
    } else {
        handle_harvest(config, config_hash, cli.fresh && !cli.resume).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("registry_harvester=info,warn"),
            1 => EnvFilter::new("registry_harvester=debug,info"),
            2 => EnvFilter::new("registry_harvester=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Registry-Harvester Dry Run ===\n");

    println!("Harvest:");
    println!("  Region: {}", config.harvest.region);
    match config.harvest.max_pages {
        Some(max) => println!("  Page limit: {}", max),
        None => println!("  Page limit: none"),
    }
    println!(
        "  Checkpoint every {} pages",
        config.harvest.checkpoint_interval
    );
    println!(
        "  Empty-page threshold: {}",
        config.harvest.empty_page_threshold
    );
    println!(
        "  Recovery attempts: {}",
        config.harvest.max_recovery_attempts
    );

    println!("\nSite:");
    println!("  Search URL: {}", config.site.search_url);
    println!("  Results: {}", config.site.results_selector);
    println!("  Pagination: {}", config.site.pagination_selector);
    println!("  End marker: {}", config.site.end_marker);
    println!(
        "  Block indicators ({}): {}",
        config.site.block_indicators.len(),
        config.site.block_indicators.join(", ")
    );

    println!("\nBrowser:");
    println!("  Driver: {:?}", config.browser.kind);
    println!("  WebDriver URL: {}", config.browser.webdriver_url);
    if let Some(dir) = &config.browser.snapshot_dir {
        println!("  Snapshot dir: {}", dir);
    }

    println!("\nBackoff:");
    println!("  Base delay: {}ms", config.backoff.base_delay_ms);
    for band in &config.backoff.bands {
        println!("  After page {}: x{}", band.after_page, band.multiplier);
    }
    println!(
        "  Rest every {} pages (x{})",
        config.backoff.rest_interval, config.backoff.rest_multiplier
    );

    println!("\nOutput:");
    println!("  CSV dir: {}", config.output.csv_dir);
    println!(
        "  Checkpoints: {} ({:?})",
        config.output.checkpoint_dir, config.output.checkpoint_backend
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --status mode: shows the region's checkpoint
fn handle_status(config: &Config) -> Result<()> {
    let region = &config.harvest.region;
    let store = open_store(&config.output).context("failed to open checkpoint store")?;
    let checkpoint = store
        .load(region)
        .with_context(|| format!("failed to read checkpoint for {}", region))?;

    print_checkpoint(region, checkpoint.as_ref());
    Ok(())
}

/// Handles the --merge mode: consolidates exported CSVs
fn handle_merge(config: &Config) -> Result<()> {
    let merger = CsvMerger::new(&config.merge).context("invalid merge configuration")?;
    let merged = merger.merge().context("merge failed")?;
    report::print_merge_report(&merged);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (ignoring any checkpoint)");
    } else {
        tracing::info!("Starting harvest (will resume from a checkpoint if one exists)");
    }

    let interrupt = InterruptFlag::new();
    let handle = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt requested; stopping at the next step");
            handle.raise();
        }
    });

    let region = config.harvest.region.clone();
    let harvest_report = run_harvest(config, Some(config_hash), fresh, interrupt)
        .await
        .with_context(|| format!("harvest for {} failed", region))?;

    print_report(&harvest_report);
    Ok(())
}
