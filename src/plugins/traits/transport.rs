use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Delivery confirmation from a listener channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub channel_id: String,
    pub bytes_sent: usize,
    pub message_id: Option<String>,
}

/// Sends one serialized batch to a named listener channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(&self, channel_id: &str, source_tag: &str, payload: &str) -> Result<Ack>;
}
