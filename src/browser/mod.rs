//! Capability interface over the browser automation engine.
//!
//! The extractor only talks to these traits; `ChromeLauncher` is the
//! production implementation and tests plug in an in-memory one.

pub mod chrome;

use async_trait::async_trait;
use std::time::Duration;

use crate::utils::error::Result;

pub use chrome::ChromeLauncher;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh browser session.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    /// Release the browser. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Load `url` and wait for the navigation to settle.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn wait_for_selector(&self, selector: &str) -> Result<()>;

    /// Rendered HTML of the current document.
    async fn content(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;

    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
