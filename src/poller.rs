use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::BrowserLauncher;
use crate::config::AppConfig;
use crate::extractor::{Extraction, Extractor};
use crate::models::Record;
use crate::notifier::{DeliveryReport, Notifier};
use crate::plugins::traits::ChannelTransport;
use crate::store::DedupStore;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollStats {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub records_persisted: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// What one poll cycle saw and did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub listed: usize,
    pub matching: usize,
    pub skipped: usize,
    pub new_records: Vec<Record>,
    pub deliveries: Vec<DeliveryReport>,
}

/// Drives poll cycles one after another until cancelled.
pub struct Poller {
    launcher: Arc<dyn BrowserLauncher>,
    extractor: Extractor,
    store: DedupStore,
    notifier: Notifier,
    interval: Duration,
    launch_timeout: Duration,
    record_deliveries: bool,
    stats: Arc<RwLock<PollStats>>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Poller {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        extractor: Extractor,
        store: DedupStore,
        notifier: Notifier,
        config: &AppConfig,
    ) -> Self {
        Self {
            launcher,
            extractor,
            store,
            notifier,
            interval: config.poll.interval(),
            launch_timeout: config.scraper.request_timeout(),
            record_deliveries: config.notifications.record_deliveries,
            stats: Arc::new(RwLock::new(PollStats::default())),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        launcher: Arc<dyn BrowserLauncher>,
        transport: Arc<dyn ChannelTransport>,
    ) -> Result<Self> {
        let extractor = Extractor::new(&config.source, &config.scraper)?;
        let store = DedupStore::new(config.store.path.clone());
        let notifier = Notifier::new(transport, &config.notifications);
        Ok(Self::new(launcher, extractor, store, notifier, config))
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub async fn stats(&self) -> PollStats {
        self.stats.read().await.clone()
    }

    /// Waits the interval, runs a cycle, repeats. Cycle failures are logged
    /// and never end the loop; only `cancel` does.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Poll loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let _ = self.run_guarded(&cancel).await;

            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Poll loop stopped");
    }

    /// Runs a single cycle immediately.
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.run_guarded(&CancellationToken::new()).await
    }

    async fn run_guarded(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let result = match AssertUnwindSafe(self.run_cycle(cancel)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(AppError::Internal(format!(
                "Poll cycle panicked: {}",
                panic_message(&*panic)
            ))),
        };

        let mut stats = self.stats.write().await;
        stats.cycles_run += 1;
        stats.last_run = Some(Utc::now());
        match &result {
            Ok(report) => {
                stats.records_persisted += report.new_records.len() as u64;
                stats.last_error = None;
            }
            Err(AppError::Cancelled) => {
                info!("Poll cycle cancelled");
            }
            Err(e) => {
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
                error!(error = %e, transient = e.is_transient(), "Poll cycle failed, trying again after interval");
            }
        }

        result
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let extraction = self.extract(cancel).await?;

        let mut report = CycleReport {
            listed: extraction.listed(),
            skipped: extraction.skipped,
            ..Default::default()
        };
        let matching = extraction.into_matching();
        report.matching = matching.len();

        report.new_records = self
            .store
            .reconcile(matching, &self.notifier.channel_names())
            .await?;

        if !report.new_records.is_empty() {
            let batch = self.notifier.dispatch(&report.new_records);
            let keys = batch.keys().to_vec();
            // Holds the next cycle back by at most send_timeout.
            report.deliveries = batch.join().await;

            if self.record_deliveries {
                self.mark_delivered(&keys, &report.deliveries).await;
            }
        }

        Ok(report)
    }

    /// Owns the browser session for the cycle: it is closed on success,
    /// failure, panic and cancellation alike.
    async fn extract(&self, cancel: &CancellationToken) -> Result<Extraction> {
        let session = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            launched = tokio::time::timeout(self.launch_timeout, self.launcher.launch()) => match launched {
                Ok(session) => session?,
                Err(_) => {
                    return Err(AppError::Timeout {
                        operation: "launch browser".to_string(),
                        millis: self.launch_timeout.as_millis() as u64,
                    })
                }
            },
        };

        let work = AssertUnwindSafe(self.extractor.extract(session.as_ref())).catch_unwind();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            outcome = work => match outcome {
                Ok(result) => result,
                Err(panic) => Err(AppError::Internal(format!(
                    "Extraction panicked: {}",
                    panic_message(&*panic)
                ))),
            },
        };

        match tokio::time::timeout(self.launch_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close browser session"),
            Err(_) => warn!("Timed out closing browser session"),
        }

        result
    }

    async fn mark_delivered(&self, keys: &[String], deliveries: &[DeliveryReport]) {
        for report in deliveries.iter().filter(|r| r.is_delivered()) {
            if let Err(e) = self.store.mark_notified(keys, &report.channel.name).await {
                warn!(channel = %report.channel.name, error = %e, "Failed to record delivery");
            }
        }
    }
}
