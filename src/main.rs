//! Spindle main entry point
//!
//! This is the command-line interface for the Spindle crawl engine.

use clap::Parser;
use spindle::config::{build_seeds, configure_engine, load_config_with_hash, Config};
use spindle::crawler::Engine;
use spindle::storage::{open_storage, Storage};
use spindle::tasks;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Spindle: a concurrent crawl engine
///
/// Spindle runs the built-in crawl tasks named in a TOML configuration file,
/// fetching pages with a pool of workers and storing the extracted items in SQLite.
#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(version)]
#[command(about = "A concurrent crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG", required_unless_present = "list_tasks")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "list_tasks")]
    dry_run: bool,

    /// List the built-in tasks and exit
    #[arg(long)]
    list_tasks: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if cli.list_tasks {
        handle_list_tasks();
        return Ok(());
    }

    let Some(config_path) = cli.config else {
        return Err("a configuration file is required".into());
    };

    tracing::info!("Loading configuration from: {}", config_path.display());
    let config = match load_config_with_hash(&config_path) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spindle=info,warn"),
            1 => EnvFilter::new("spindle=debug,info"),
            2 => EnvFilter::new("spindle=trace,debug"),
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

fn handle_list_tasks() {
    let registry = tasks::registry();
    println!("Built-in tasks ({}):", registry.len());
    for name in registry.names() {
        if let Some(task) = registry.get(name) {
            println!("  - {} ({})", name, task.property.url);
            for rule in task.rules.rule_names() {
                println!("    * {}", rule);
            }
        }
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = tasks::registry();

    println!("=== Spindle Dry Run ===\n");

    println!("Engine Configuration:");
    println!("  Workers: {}", config.engine.worker_count);
    println!(
        "  Min content length: {} bytes",
        config.engine.min_content_length
    );
    if config.engine.queue_capacity == 0 {
        println!("  Queue: unbounded");
    } else {
        println!(
            "  Queue: {} requests ({:?} when full)",
            config.engine.queue_capacity, config.engine.queue_overflow
        );
    }

    println!("\nFetcher:");
    println!("  Timeout: {}ms", config.fetcher.timeout_ms);
    if let Some(proxy) = &config.fetcher.proxy {
        println!("  Proxy: {}", proxy);
    }

    println!("\nStorage:");
    match &config.storage.database_path {
        Some(path) => println!("  Database: {} (batch {})", path, config.storage.batch_count),
        None => println!("  Database: none, items are logged only"),
    }

    println!("\nTasks ({}):", config.tasks.len());
    let mut unknown = Vec::new();
    for entry in &config.tasks {
        match registry.get(&entry.name) {
            Some(task) => {
                println!("  - {} ({:?} fetcher)", entry.name, entry.fetcher);
                println!(
                    "    max depth: {}, reload: {}, limits: {}",
                    entry.max_depth.unwrap_or(task.property.max_depth),
                    entry.reload.unwrap_or(task.property.reload),
                    entry.limits.len()
                );
            }
            None => {
                println!("  - {} (not a built-in task)", entry.name);
                unknown.push(entry.name.as_str());
            }
        }
    }

    if !unknown.is_empty() {
        return Err(format!("unknown tasks: {}", unknown.join(", ")).into());
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage: Option<Arc<dyn Storage>> = match &config.storage.database_path {
        Some(path) => {
            tracing::info!("Storing items in {}", path);
            Some(Arc::new(open_storage(
                Path::new(path),
                config.storage.batch_count,
            )?))
        }
        None => {
            tracing::warn!("No database-path configured, items will only be logged");
            None
        }
    };

    let seeds = build_seeds(&config, storage)?;
    let engine = configure_engine(
        Engine::builder(Arc::new(tasks::registry())),
        &config.engine,
    )
    .build();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping crawl");
            ctrl_c.cancel();
        }
    });

    match engine.run(seeds, cancel).await {
        Ok(report) => {
            if report.cancelled {
                tracing::info!("Crawl stopped early");
            } else {
                tracing::info!("Crawl completed successfully");
            }
            if !report.failures.is_empty() {
                tracing::warn!("{} requests failed at least once", report.failures.len());
            }
            println!("{}", report.stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
