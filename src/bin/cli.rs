//! RSS aggregator CLI
//!
//! Runs one ingestion pass against the configured backends.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rss_aggregator::{
    error::Result,
    models::Config,
    notify::{self, ChangeNotifier},
    pipeline::{self, IngestPipeline},
    services::{FeedSource, FileFeedSource, HttpFeedSource},
    storage, utils,
};

/// RSS feed aggregator
#[derive(Parser, Debug)]
#[command(
    name = "rss-aggregator",
    version,
    about = "Ingests an RSS feed and announces new items"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where to read the feed from (defaults to `feed.url`).
#[derive(Args, Debug)]
struct FeedArgs {
    /// Feed URL
    #[arg(long, conflicts_with = "file")]
    url: Option<String>,

    /// RSS file on disk
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one fetch, store and notify pass
    Ingest(FeedArgs),

    /// Fetch and normalize only, printing the records as JSON
    Parse(FeedArgs),

    /// Validate the configuration file
    Validate,

    /// Show record and event counts for the configured backends
    Info,
}

/// Initialize logging from the configured level; `--verbose` forces debug.
fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Pick the feed source and location for a command.
fn feed_source(args: FeedArgs, config: &Config) -> Result<(Box<dyn FeedSource>, String)> {
    if let Some(path) = args.file {
        return Ok((
            Box::new(FileFeedSource::default()),
            path.display().to_string(),
        ));
    }

    let location = args.url.unwrap_or_else(|| config.feed.url.clone());
    if utils::is_remote(&location) {
        Ok((Box::new(HttpFeedSource::new(&config.feed)?), location))
    } else {
        Ok((Box::new(FileFeedSource::default()), location))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging.level, cli.verbose);

    if cli.config.exists() {
        log::info!("Loaded configuration from {}", cli.config.display());
    } else {
        log::warn!(
            "No configuration at {}, using defaults",
            cli.config.display()
        );
    }

    match cli.command {
        Command::Ingest(args) => {
            config.validate()?;
            let (source, location) = feed_source(args, &config)?;

            let store = storage::open(&config.storage, config.pipeline.max_concurrent).await?;
            let events = notify::open(&config.events).await?;
            let notifier = ChangeNotifier::new(events, config.events.channel.clone())
                .with_concurrency(config.pipeline.max_concurrent);

            let ingest = IngestPipeline::from_config(&config.pipeline, store, notifier);
            let summary = ingest.run_pass(source.as_ref(), &location).await?;

            if !summary.notify_failures.is_empty() {
                let ids: Vec<&str> = summary
                    .notify_failures
                    .iter()
                    .map(|f| f.id.as_str())
                    .collect();
                log::warn!("Ids still to publish: {}", ids.join(", "));
            }
        }

        Command::Parse(args) => {
            let (source, location) = feed_source(args, &config)?;
            let feed = source.fetch(&location).await?;

            let batch = pipeline::prepare_batch(&feed, config.pipeline.degenerate_ids);

            log::info!(
                "Normalized {} entries from '{}' ({} rejected)",
                batch.normalized,
                feed.title,
                batch.rejected
            );
            println!("{}", serde_json::to_string_pretty(&batch.records)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "Config OK (storage: {:?}, events: {:?}, channel: {})",
                config.storage.backend,
                config.events.backend,
                config.events.channel
            );
        }

        Command::Info => {
            config.validate()?;
            let store = storage::open(&config.storage, config.pipeline.max_concurrent).await?;
            let events = notify::open(&config.events).await?;

            log::info!("Feed: {}", config.feed.url);
            log::info!("Stored records: {}", store.count().await?);
            log::info!(
                "Events on {}: {}",
                config.events.channel,
                events.entry_count(&config.events.channel).await?
            );
        }
    }

    Ok(())
}
