//! gallery-harvest main entry point
//!
//! This is the command-line interface for the gallery-harvest crawler.

use anyhow::Context;
use clap::Parser;
use gallery_harvest::config::{load_config_with_hash, Config};
use gallery_harvest::crawler::{run_harvest, ClaimScheduler, Coordinator};
use gallery_harvest::output::{load_statistics, print_run_summary, print_statistics};
use gallery_harvest::seed::{load_name_list, seed_surnames};
use gallery_harvest::storage::open_store;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// gallery-harvest: a multi-worker gallery crawler
///
/// Seeds surnames from a name list, then runs a pool of workers that search
/// the site for each surname, read every profile's gallery listing and
/// download a sample of its images. Progress lives in a SQLite database, so
/// an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "gallery-harvest")]
#[command(version)]
#[command(about = "A multi-worker gallery crawler", long_about = None)]
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

    /// Validate config and show what would run without touching the database
    #[arg(long, conflicts_with_all = ["stats", "seed_only"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "seed_only"])]
    stats: bool,

    /// Seed surnames from the name list and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    seed_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config comes first: it names the optional log file
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    setup_logging(cli.verbose, cli.quiet, config.output.log_file.as_deref())?;
    tracing::info!(
        path = %cli.config.display(),
        hash = %config_hash,
        "Configuration loaded"
    );

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.seed_only {
        handle_seed_only(&config)
    } else {
        handle_harvest(config).await
    }
}

/// Sets up the logging/tracing subscriber
///
/// Stderr follows the verbosity flags. When a log file is configured it
/// additionally receives debug-level output with thread names.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("gallery_harvest=info,warn"),
            1 => EnvFilter::new("gallery_harvest=debug,info"),
            2 => EnvFilter::new("gallery_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_filter(EnvFilter::new("gallery_harvest=debug,info")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows the plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== gallery-harvest Dry Run ===\n");

    println!("Pipeline:");
    println!("  Workers: {}", config.pipeline.workers);
    println!("  Worker stagger: {}ms", config.pipeline.worker_stagger_ms);
    println!("  Items per record: {}", config.pipeline.items_per_record);
    match config.pipeline.lease_secs {
        Some(lease) => println!("  Claim lease: {}s", lease),
        None => println!("  Claim lease: disabled"),
    }

    println!("\nSite:");
    println!("  Search URL: {}", config.site.search_url);
    println!("  API URL: {}", config.site.api_url);
    println!("  Photo URL: {}", config.site.photo_url);
    println!("  Variants: {}", config.site.variants.join(", "));

    println!("\nPoliteness:");
    println!("  Search delay: {}ms", config.politeness.search_delay_ms);
    println!("  Gallery delay: {}ms", config.politeness.gallery_delay_ms);
    println!("  Download delay: {}ms", config.politeness.download_delay_ms);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Assets: {}", config.output.assets_root);
    if let Some(log_file) = &config.output.log_file {
        println!("  Log file: {}", log_file);
    }

    let names = load_name_list(Path::new(&config.seed.name_list))?;
    println!("\nSeed:");
    println!("  Name list: {} ({} names)", config.seed.name_list, names.len());
    println!("  New surnames per run: {}", config.seed.name_count);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would run {} workers as {} .. {}",
        config.pipeline.workers,
        Coordinator::worker_name(0),
        Coordinator::worker_name(config.pipeline.workers as usize - 1)
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_store(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --seed-only mode: registers surnames and exits
fn handle_seed_only(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(open_store(Path::new(&config.output.database_path))?);
    let names = load_name_list(Path::new(&config.seed.name_list))?;
    let seeder = ClaimScheduler::new(store, "seeder");
    let report = seed_surnames(&seeder, &names, config.seed.name_count as usize)?;

    println!(
        "✓ Seeded {} new surnames ({} already known)",
        report.added, report.skipped
    );
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing records in flight");
            let _ = shutdown_tx.send(true);
        }
    });

    let db_path = config.output.database_path.clone();
    let report = run_harvest(config, shutdown_rx)
        .await
        .context("Harvest could not start")?;

    print_run_summary(&report);

    let store = open_store(Path::new(&db_path))?;
    print_statistics(&load_statistics(&store)?);

    if !report.failures.is_empty() {
        anyhow::bail!("{} worker(s) stopped on storage errors", report.failures.len());
    }

    Ok(())
}
