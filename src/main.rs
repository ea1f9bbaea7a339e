// src/main.rs

//! cinesync CLI
//!
//! Local execution entry point. The surrounding application embeds the
//! library and exposes the same operations through its admin surface.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cinesync::{
    config::Config,
    error::{AppError, Result},
    notify::{LogSink, MemoryDirectory},
    sources::SourceId,
    store::{ContentStore, JsonStore},
    sync::{PageRange, SyncDepth, SyncOrchestrator},
};

/// cinesync - Movie Catalog Sync
#[derive(Parser, Debug)]
#[command(name = "cinesync", version, about = "Multi-source movie catalog crawler")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory holding the local catalog store
    #[arg(short, long, default_value = "storage")]
    store_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a page range from all sources
    Sync {
        /// First page (1-based)
        #[arg(long, default_value_t = 1)]
        from: u64,

        /// Last page, inclusive
        #[arg(long, default_value_t = 3)]
        to: u64,

        /// Deep pass: fetch detail even for items that look unchanged
        #[arg(long)]
        deep: bool,
    },

    /// Fetch one item on demand, overriding the blacklist
    Fetch {
        slug: String,

        /// Only try this source (ophim | kkphim | nguonc)
        #[arg(long)]
        source: Option<String>,
    },

    /// Search one source's listing by name (no persistence)
    Search {
        query: String,

        /// Source to search (defaults to the highest-priority one)
        #[arg(long)]
        source: Option<String>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn parse_source(hint: Option<String>) -> Result<Option<SourceId>> {
    match hint {
        None => Ok(None),
        Some(raw) => SourceId::parse(&raw)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("unknown source '{raw}'"))),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    let store = Arc::new(JsonStore::new(&cli.store_dir));
    let orchestrator = SyncOrchestrator::from_config(
        &config,
        store.clone(),
        Arc::new(MemoryDirectory::new()),
        Arc::new(LogSink),
    )?;

    match cli.command {
        Command::Sync { from, to, deep } => {
            let range = PageRange::new(from, to)?;
            let depth = if deep { SyncDepth::Full } else { SyncDepth::Latest };

            let report = orchestrator.trigger_sync(range, depth).await?;
            log::info!(
                "completed with {} failure(s): {} processed, {} skipped across {} page(s)",
                report.failed,
                report.processed,
                report.skipped,
                report.pages
            );
            log::info!("catalog now holds {} item(s)", store.len().await?);

            let status = orchestrator.status();
            if status.blacklist_size > 0 {
                log::warn!(
                    "{} slug(s) blacklisted this run: {:?}",
                    status.blacklist_size,
                    orchestrator.blacklist()
                );
            }
        }

        Command::Fetch { slug, source } => {
            let hint = parse_source(source)?;
            match orchestrator.fetch_specific_item(&slug, hint).await? {
                Some(item) => {
                    log::info!(
                        "'{}' updated: {} [{}], {} stream group(s)",
                        item.slug,
                        item.name,
                        item.episode_current,
                        item.stream_groups.len()
                    );
                }
                None => {
                    log::error!("'{slug}' not found on any source");
                    return Err(AppError::validation(format!(
                        "item '{slug}' not found across all sources"
                    )));
                }
            }
        }

        Command::Search { query, source } => {
            let hint = parse_source(source)?;
            let hits = orchestrator.search_by_name(&query, hint).await;
            if hits.is_empty() {
                log::info!("no matches for '{query}'");
            }
            for hit in hits {
                log::info!(
                    "{} ({}){}",
                    hit.name,
                    hit.slug,
                    hit.episode_current
                        .map(|e| format!(" - {e}"))
                        .unwrap_or_default()
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!("Config OK ({} sources configured)", SourceId::ALL.len());
        }
    }

    Ok(())
}
