//! aoty-harvest main entry point
//!
//! This is the command-line interface for the aoty-harvest pipeline.

use anyhow::Context;
use aoty_harvest::config::{load_config_with_hash, Config};
use aoty_harvest::crawler::{Coordinator, PipelineError};
use aoty_harvest::output::{print_state_stats, print_summary, JsonLinesSink, RecordSink};
use aoty_harvest::storage::{open_store, StateStore};
use clap::Parser;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// aoty-harvest: a polite crawl-and-extract pipeline
///
/// aoty-harvest crawls review pages breadth-first with bounded concurrency,
/// extracts records through a selector-based schema, and writes them as
/// JSON Lines. Failed pages are reported without stopping the run.
#[derive(Parser, Debug)]
#[command(name = "aoty-harvest")]
#[command(version)]
#[command(about = "A polite crawl-and-extract pipeline", long_about = None)]
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

    /// Forget the persisted seen set and frontier before running
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show persisted state statistics and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, config_hash, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout may carry records.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("aoty_harvest=info,warn"),
            1 => EnvFilter::new("aoty_harvest=debug,info"),
            2 => EnvFilter::new("aoty_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== aoty-harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!(
        "  Max per-host concurrency: {}",
        config.crawler.max_per_host_concurrency
    );
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay_ms);
    println!("  Max depth: {}", config.crawler.max_depth);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!(
        "  Records: {}",
        config.output.records_path.as_deref().unwrap_or("stdout")
    );
    println!(
        "  State: {}",
        config.output.state_path.as_deref().unwrap_or("(not persisted)")
    );

    let fields = config.extraction.resolved_fields()?;
    println!("\nExtraction Fields ({}):", fields.len());
    for field in &fields {
        println!("  - {} ({:?}): {}", field.name, field.kind, field.selector);
        for sub in &field.fields {
            println!("    * {} ({:?}): {}", sub.name, sub.kind, sub.selector);
        }
    }
    println!(
        "\nLink Pattern: {}",
        config
            .extraction
            .resolved_link_pattern()
            .unwrap_or_else(|| "(same host)".to_string())
    );

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start harvesting from {} seeds", config.seeds.len());

    Ok(())
}

/// Handles the --stats mode: shows persisted state
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let Some(path) = &config.output.state_path else {
        println!("No state-path configured; nothing is persisted between runs.");
        return Ok(());
    };

    println!("State database: {}\n", path);
    let store = open_store(Path::new(path))
        .with_context(|| format!("failed to open state database {}", path))?;
    print_state_stats(&store.stats()?);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<ExitCode> {
    if fresh {
        tracing::info!("Starting fresh harvest (ignoring previous state)");
    }

    let mut sink: Box<dyn RecordSink + Send> = match &config.output.records_path {
        Some(path) => Box::new(
            JsonLinesSink::create(Path::new(path))
                .with_context(|| format!("failed to open records file {}", path))?,
        ),
        None => Box::new(JsonLinesSink::new(BufWriter::new(io::stdout()))),
    };

    let mut coordinator = Coordinator::new(config, fresh)?;
    coordinator.set_config_hash(config_hash);

    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping dispatch");
            cancel.cancel();
        }
    });

    let summary = coordinator.run(&mut sink).await.context("harvest failed")?;
    print_summary(&summary);

    if summary.cancelled {
        return Ok(ExitCode::from(130));
    }

    match PipelineError::check(summary) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::warn!("{}", e);
            Ok(ExitCode::from(2))
        }
    }
}
