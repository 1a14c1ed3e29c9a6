//! Command-line driver for the Folio offline runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Cache the manifest from a running site and drop stale generations
//! folio --config folio.json warm --store caches.json
//!
//! # Ask the worker for a URL, pretending the network is down
//! folio fetch / --store caches.json --offline --navigate
//!
//! # Run the hero rotator for ten timer firings with sources 1 and 3 broken
//! folio simulate --timers 10 --broken 1 --broken 3
//!
//! # Print the effective configuration
//! folio config
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use folio_common::init_logging;
use folio_core::FolioConfig;
use folio_media::{Rotator, RotatorConfig};
use folio_net::{Fetcher, HttpFetcher, FetcherConfig, NetError, Request, Response};
use folio_sw::{FetchDecision, MemoryCacheStorage, OfflineWorker, StorageSnapshot};
use tracing::info;

mod simulate;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Offline cache worker and hero media rotator for the portfolio site")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the manifest into the current generation and activate it
    Warm {
        /// Cache snapshot to read and update
        #[arg(short, long, default_value = "folio-caches.json")]
        store: PathBuf,
    },

    /// Send one GET request through the worker
    Fetch {
        /// Path or absolute URL
        target: String,
        /// Cache snapshot to read and update
        #[arg(short, long, default_value = "folio-caches.json")]
        store: PathBuf,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Fail every network request
        #[arg(long)]
        offline: bool,
    },

    /// Run the media rotator on a virtual clock
    Simulate {
        /// Number of timers to fire
        #[arg(short, long, default_value = "12")]
        timers: usize,
        /// Source index whose loads fail (repeatable)
        #[arg(short, long)]
        broken: Vec<usize>,
    },

    /// Print the effective configuration as JSON
    Config,
}

/// Fetcher for `--offline`: every request fails.
struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        Err(NetError::Offline(request.url.to_string()))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(config.logging.to_log_config()?)?;

    match cli.command {
        Commands::Warm { store } => warm(&config, &store).await?,
        Commands::Fetch {
            target,
            store,
            navigate,
            offline,
        } => fetch(&config, &store, &target, navigate, offline).await?,
        Commands::Simulate { timers, broken } => simulate(&config, timers, broken)?,
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FolioConfig> {
    let mut config = match path {
        Some(path) => FolioConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => FolioConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn open_store(path: &Path) -> anyhow::Result<Arc<MemoryCacheStorage>> {
    let snapshot = StorageSnapshot::load_or_default(path)?;
    info!(path = %path.display(), generations = snapshot.generations.len(), "Opened cache store");
    Ok(Arc::new(MemoryCacheStorage::from_snapshot(snapshot)))
}

async fn save_store(path: &Path, storage: &MemoryCacheStorage) -> anyhow::Result<()> {
    storage.snapshot().await.save(path)?;
    Ok(())
}

async fn warm(config: &FolioConfig, store: &Path) -> anyhow::Result<()> {
    let storage = open_store(store)?;
    let fetcher = Arc::new(HttpFetcher::new(FetcherConfig::default())?);
    let (worker, _events) = OfflineWorker::new(config.worker.clone(), storage.clone(), fetcher);

    let install = worker.install().await;
    let activate = worker.activate().await;
    save_store(store, &storage).await?;

    println!("Generation: {}", install.version);
    println!("  Cached:  {}", install.cached.len());
    for failure in &install.failed {
        println!("  Failed:  {} ({})", failure.entry, failure.reason);
    }
    for name in &activate.deleted {
        println!("  Deleted: {name}");
    }

    if !install.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

async fn fetch(
    config: &FolioConfig,
    store: &Path,
    target: &str,
    navigate: bool,
    offline: bool,
) -> anyhow::Result<()> {
    let storage = open_store(store)?;
    let fetcher: Arc<dyn Fetcher> = if offline {
        Arc::new(OfflineFetcher)
    } else {
        Arc::new(HttpFetcher::new(FetcherConfig::default())?)
    };
    let (worker, _events) = OfflineWorker::new(config.worker.clone(), storage.clone(), fetcher);

    let url = worker.resolve(target)?;
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    match worker.handle_fetch(&request).await {
        FetchDecision::Passthrough => println!("{} is not intercepted", request.url),
        FetchDecision::Respond(response) => {
            println!(
                "{} {} ({:?}, {} bytes)",
                response.response.status.as_u16(),
                response.response.status_text(),
                response.source,
                response.response.body.len()
            );
        }
    }

    worker.settle().await;
    save_store(store, &storage).await?;
    Ok(())
}

fn simulate(config: &FolioConfig, timers: usize, broken: Vec<usize>) -> anyhow::Result<()> {
    let rotator = Rotator::new(RotatorConfig::from_settings(&config.rotator))?;
    for step in simulate::Simulation::new(rotator, broken).run(timers) {
        println!("{}", simulate::describe(&step));
    }
    Ok(())
}
