use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::plugins::traits::{Ack, ChannelTransport};
use crate::utils::error::Result;

/// Posts each batch to `{base_url}/{channel_id}`.
pub struct WebhookTransport {
    client: Client,
    base_url: String,
}

impl WebhookTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn endpoint(&self, channel_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), channel_id)
    }
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    async fn send(&self, channel_id: &str, source_tag: &str, payload: &str) -> Result<Ack> {
        let data: serde_json::Value = serde_json::from_str(payload)?;
        let body = json!({
            "channel": channel_id,
            "source": source_tag,
            "data": data,
        });

        let response = self
            .client
            .post(self.endpoint(channel_id))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(Ack {
            channel_id: channel_id.to_string(),
            bytes_sent: payload.len(),
            message_id,
        })
    }
}
