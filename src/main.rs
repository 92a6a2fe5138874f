//! Tidemark main entry point
//!
//! This is the command-line interface for the Tidemark web archiver.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tidemark::config::{load_config_with_hash, Config};
use tidemark::crawler::{lock_storage, Coordinator};
use tidemark::output::{load_statistics, print_statistics};
use tidemark::storage::SqliteStorage;
use tracing_subscriber::EnvFilter;

/// Tidemark: a continuous web archiver
///
/// Tidemark re-fetches known URLs once they go stale, keeps every response
/// body in a content-addressed blob store and records the link graph
/// between pages.
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version = "1.0.0")]
#[command(about = "A continuous web archiver", long_about = None)]
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

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "once"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "once"])]
    stats: bool,

    /// Run a single crawl cycle and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.once).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidemark=info,warn"),
            1 => EnvFilter::new("tidemark=debug,info"),
            2 => EnvFilter::new("tidemark=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Tidemark Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_secs);
    println!("  Cycle interval: {}s", config.crawler.cycle_interval_secs);
    match config.crawler.max_cycles {
        Some(max) => println!("  Max cycles: {}", max),
        None => println!("  Max cycles: unlimited"),
    }

    println!("\nFrontier:");
    println!("  Stale after: {}s", config.frontier.stale_duration_secs);
    println!("  Batch size: {}", config.frontier.batch_size);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Blobs: {}", config.output.blob_path);

    println!("\nSeeds ({}):", config.frontier.seeds.len());
    for seed in &config.frontier.seeds {
        println!("  - {}", seed);
    }

    println!("\nConfiguration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the crawl: one cycle with --once, otherwise until stopped
async fn handle_crawl(config: Config, once: bool) -> Result<()> {
    tracing::info!(
        "Starting archiver with {} seed URLs and {} workers",
        config.frontier.seeds.len(),
        config.crawler.max_concurrent_fetches
    );

    let coordinator = Coordinator::new(config).context("Failed to initialize crawler")?;

    if once {
        let summary = coordinator.run_cycle().await.context("Crawl cycle failed")?;
        tracing::info!(
            "Cycle complete: {} dispatched, {} succeeded, {} failed, {} links",
            summary.dispatched,
            summary.succeeded,
            summary.failed,
            summary.links
        );
    } else {
        coordinator.run().await.context("Crawl failed")?;
    }

    let storage = coordinator.storage();
    let stats = load_statistics(&*lock_storage(&storage))?;
    tracing::info!(
        "Archive now holds {} URLs ({} fetched), {} links, {} snapshots",
        stats.total_urls,
        stats.fetched_urls,
        stats.total_links,
        stats.total_snapshots
    );

    Ok(())
}
