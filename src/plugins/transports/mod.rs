// Channel transport implementations
#[cfg(unix)]
pub mod unix_socket;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::plugins::traits::ChannelTransport;
use crate::utils::error::Result;

#[cfg(unix)]
pub use unix_socket::UnixSocketTransport;
pub use webhook::WebhookTransport;

pub fn from_config(config: &TransportConfig, timeout: Duration) -> Result<Arc<dyn ChannelTransport>> {
    match config {
        #[cfg(unix)]
        TransportConfig::UnixSocket { socket_dir } => Ok(Arc::new(UnixSocketTransport::new(socket_dir.clone()))),
        #[cfg(not(unix))]
        TransportConfig::UnixSocket { .. } => Err(crate::utils::error::AppError::Internal(
            "Unix socket transport is not available on this platform".to_string(),
        )),
        TransportConfig::Webhook { base_url } => Ok(Arc::new(WebhookTransport::new(base_url.clone(), timeout)?)),
    }
}
