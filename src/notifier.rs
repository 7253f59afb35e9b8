use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NotificationsConfig;
use crate::models::Record;
use crate::plugins::traits::{Ack, ChannelTransport};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Flag name on persisted records, e.g. `email`.
    pub name: String,
    /// Listener address, e.g. `myappemailListener`.
    pub id: String,
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub channel: Channel,
    pub outcome: std::result::Result<Ack, String>,
}

/// In-flight sends for one batch, one task per channel.
pub struct DispatchBatch {
    keys: Vec<String>,
    tasks: Vec<(Channel, JoinHandle<Result<Ack>>)>,
}

/// Fans newly persisted records out to every configured channel.
pub struct Notifier {
    transport: Arc<dyn ChannelTransport>,
    channels: Vec<Channel>,
    source_tag: String,
    send_timeout: Duration,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl DispatchBatch {
    fn empty() -> Self {
        Self {
            keys: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Keys of the records carried by this batch.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Waits for every channel and logs its outcome. A failed or panicked
    /// channel only shows up in its own report.
    pub async fn join(self) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());

        for (channel, handle) in self.tasks {
            let outcome = match handle.await {
                Ok(Ok(ack)) => {
                    info!(channel = %channel.name, bytes = ack.bytes_sent, "Data sent to {} listener", channel.name);
                    Ok(ack)
                }
                Ok(Err(e)) => {
                    warn!(channel = %channel.name, error = %e, "Failed to notify listener");
                    Err(e.to_string())
                }
                Err(e) => {
                    warn!(channel = %channel.name, error = %e, "Notification task aborted");
                    Err(format!("Notification task aborted: {}", e))
                }
            };
            reports.push(DeliveryReport { channel, outcome });
        }

        reports
    }
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChannelTransport>, config: &NotificationsConfig) -> Self {
        let channels = config
            .channels
            .iter()
            .map(|name| Channel {
                name: name.clone(),
                id: config.channel_id(name),
            })
            .collect();

        Self {
            transport,
            channels,
            source_tag: config.source_tag.clone(),
            send_timeout: config.send_timeout(),
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Starts one independent send per channel and returns immediately. Does
    /// nothing for an empty batch.
    pub fn dispatch(&self, records: &[Record]) -> DispatchBatch {
        if records.is_empty() {
            debug!("No new records to dispatch");
            return DispatchBatch::empty();
        }

        let batch = Arc::new(records.to_vec());
        let tasks = self
            .channels
            .iter()
            .map(|channel| {
                let transport = Arc::clone(&self.transport);
                let batch = Arc::clone(&batch);
                let channel_id = channel.id.clone();
                let source_tag = self.source_tag.clone();
                let send_timeout = self.send_timeout;

                let handle = tokio::spawn(async move {
                    let payload = serde_json::to_string(batch.as_slice())?;
                    match tokio::time::timeout(send_timeout, transport.send(&channel_id, &source_tag, &payload)).await {
                        Ok(result) => result,
                        Err(_) => Err(AppError::Timeout {
                            operation: format!("send to {}", channel_id),
                            millis: send_timeout.as_millis() as u64,
                        }),
                    }
                });
                (channel.clone(), handle)
            })
            .collect();

        DispatchBatch {
            keys: records.iter().map(|r| r.key.clone()).collect(),
            tasks,
        }
    }
}
