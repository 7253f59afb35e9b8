use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use listing_watcher::browser::ChromeLauncher;
use listing_watcher::config::LoggingConfig;
use listing_watcher::plugins::transports;
use listing_watcher::{AppConfig, DedupStore, Poller};

#[derive(Parser, Debug)]
#[command(name = "listing-watcher", version, about = "Watches a listings page and notifies listeners about new matches")]
struct Cli {
    /// Config file, defaults to config/default.* when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the store location
    #[arg(long)]
    store: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the stored listings and exit
    #[arg(long)]
    list: bool,
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("listing_watcher={}", logging.level)))?;
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "listing-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    let _log_guard = init_tracing(&config.logging)?;

    let store = DedupStore::new(config.store.path.clone());
    if cli.list {
        for record in store.load().await? {
            println!("{}\t{}", record.display_text, record.key);
        }
        return Ok(());
    }

    info!("Starting Listing Watcher...");
    store.initialize().await?;

    let launcher = Arc::new(ChromeLauncher::new(config.scraper.clone()));
    let transport = transports::from_config(
        &config.notifications.transport,
        config.notifications.send_timeout(),
    )?;
    let poller = Poller::from_config(&config, launcher, transport)?;

    if cli.once {
        let report = poller.run_once().await?;
        info!(
            listed = report.listed,
            matching = report.matching,
            new = report.new_records.len(),
            "Poll cycle complete"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shutdown.cancel();
        }
    });

    poller.run(cancel).await;

    let stats = poller.stats().await;
    info!(
        cycles = stats.cycles_run,
        failed = stats.cycles_failed,
        persisted = stats.records_persisted,
        "Stopped"
    );

    Ok(())
}
