use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::plugins::traits::{Ack, ChannelTransport};
use crate::utils::error::{AppError, Result};

/// Listener messages are JSON envelopes terminated by a form feed.
const MESSAGE_DELIMITER: u8 = b'\x0c';

/// Reaches listener processes through Unix domain sockets named after their
/// channel id, e.g. `/tmp/myappemailListener`.
pub struct UnixSocketTransport {
    socket_dir: PathBuf,
}

impl UnixSocketTransport {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    pub fn socket_path(&self, channel_id: &str) -> PathBuf {
        self.socket_dir.join(channel_id)
    }

    fn encode(source_tag: &str, payload: &str) -> Result<Vec<u8>> {
        let envelope = json!({
            "type": source_tag,
            "data": payload,
        });
        let mut message = serde_json::to_vec(&envelope)?;
        message.push(MESSAGE_DELIMITER);
        Ok(message)
    }
}

#[async_trait]
impl ChannelTransport for UnixSocketTransport {
    async fn send(&self, channel_id: &str, source_tag: &str, payload: &str) -> Result<Ack> {
        let path = self.socket_path(channel_id);
        let failed = |message: String| AppError::Notification {
            channel: channel_id.to_string(),
            message,
        };

        let mut stream = UnixStream::connect(&path)
            .await
            .map_err(|e| failed(format!("connect {}: {}", path.display(), e)))?;

        let message = Self::encode(source_tag, payload)?;
        stream
            .write_all(&message)
            .await
            .map_err(|e| failed(format!("write: {}", e)))?;
        stream
            .shutdown()
            .await
            .map_err(|e| failed(format!("shutdown: {}", e)))?;

        Ok(Ack {
            channel_id: channel_id.to_string(),
            bytes_sent: message.len(),
            message_id: None,
        })
    }
}
