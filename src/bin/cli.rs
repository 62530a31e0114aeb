//! jobscout CLI
//!
//! Local execution entry point: one-off runs, interval runs and category
//! management against the local store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jobscout::{
    error::Result,
    models::Config,
    notify::OutboxNotifier,
    pipeline::{Coordinator, RunReport, RunRequest, RunSettings},
    sources::board_factories,
    storage::{JobStore, LocalStore},
    utils::http,
};
use tokio_util::sync::CancellationToken;

/// jobscout - Job Board Aggregator
#[derive(Parser, Debug)]
#[command(
    name = "jobscout",
    version,
    about = "Aggregates job postings from external boards"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape every category once and persist the results
    Run {
        #[command(flatten)]
        options: RunOptions,
    },

    /// Scrape on a fixed interval until interrupted
    Watch {
        /// Seconds between run starts
        #[arg(long, default_value_t = 3600)]
        every: u64,

        #[command(flatten)]
        options: RunOptions,
    },

    /// List categories, or add one
    Categories {
        /// Category name to add
        #[arg(long)]
        add: Option<String>,
    },

    /// Show persisted jobs
    Jobs {
        /// Show only the most recent N jobs
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Validate the configuration file
    Validate,
}

#[derive(clap::Args, Debug, Clone)]
struct RunOptions {
    /// Write a digest to the outbox after persisting
    #[arg(long)]
    notify: bool,

    /// Only scrape categories whose name contains this term
    #[arg(long)]
    category: Option<String>,

    /// Location filter (overrides search.location)
    #[arg(long)]
    location: Option<String>,
}

impl From<RunOptions> for RunRequest {
    fn from(options: RunOptions) -> Self {
        Self {
            notify: options.notify,
            search_term: options.category,
            location: options.location,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_coordinator(config: &Config, store: Arc<LocalStore>) -> Result<Coordinator> {
    let client = http::create_client(&config.scraper)?;
    let factories = board_factories(&config.boards.enabled, &client, &config.scraper);
    let notifier = OutboxNotifier::from_config(&config.notify)?;

    Ok(Coordinator::new(store, factories, RunSettings::from(config)).with_notifier(Arc::new(notifier)))
}

/// Cancel the token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling in-flight scrapes...");
            token.cancel();
        }
    });
    cancel
}

fn log_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    log::info!(
        "Run {} finished in {}s: {} records, {} persisted, {} failed pages across {} pools{}",
        report.run_id,
        elapsed.num_seconds(),
        report.records.len(),
        report.persisted,
        report.failures.len(),
        report.pools_launched,
        if report.notified { ", digest sent" } else { "" }
    );
    for failure in &report.failures {
        log::debug!(
            "  {} page {}: {}",
            failure.source,
            failure.page,
            failure.error
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("jobscout starting...");

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    let store = Arc::new(LocalStore::new(&config.storage.dir));

    match cli.command {
        Command::Run { options } => {
            config.validate()?;
            let coordinator = build_coordinator(&config, Arc::clone(&store))?;
            let cancel = cancel_on_interrupt();

            let report = coordinator.run(&cancel, &options.into()).await?;
            log_report(&report);
        }

        Command::Watch { every, options } => {
            config.validate()?;
            let coordinator = build_coordinator(&config, Arc::clone(&store))?;
            let cancel = cancel_on_interrupt();
            let request: RunRequest = options.into();

            let mut ticker = tokio::time::interval(Duration::from_secs(every.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match coordinator.run(&cancel, &request).await {
                    Ok(report) => log_report(&report),
                    Err(e) => log::error!("Run failed: {}", e),
                }
            }
        }

        Command::Categories { add } => {
            if let Some(name) = add {
                let category = store.create_category(&name).await?;
                log::info!("Category '{}' ({})", category.name, category.id);
            }

            let categories = store.get_categories().await?;
            if categories.is_empty() {
                log::info!("No categories yet. Add one with 'categories --add <NAME>'.");
            }
            for category in categories {
                println!("{}\t{}", category.id, category.name);
            }
        }

        Command::Jobs { limit } => {
            let jobs = store.list_jobs().await?;
            log::info!("{} jobs in {}", jobs.len(), store.root_dir().display());

            for stored in jobs.iter().rev().take(limit) {
                println!(
                    "{}\t{}\t{}\t{}",
                    stored.created_at.format("%Y-%m-%d %H:%M"),
                    stored.job.origin,
                    stored.job.title,
                    stored.job.link
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            if let Some(template) = &config.notify.template {
                jobscout::notify::DigestRenderer::from_file(template)?.render(&[])?;
                log::info!("✓ Digest template OK ({})", template.display());
            }
            log::info!(
                "✓ Config OK ({} boards, {} pages each)",
                config.boards.enabled.len(),
                config.scraper.pages
            );

            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}
