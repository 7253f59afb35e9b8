use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserLauncher, BrowserSession, Page};
use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

/// Launches a headless Chrome per session.
pub struct ChromeLauncher {
    config: Arc<ScraperConfig>,
}

pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    config: Arc<ScraperConfig>,
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

/// headless_chrome blocks on the DevTools socket, so every call is moved off
/// the runtime threads.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Browser(format!("Browser task failed: {}", e)))?
        .map_err(AppError::browser)
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn launch_options(config: &ScraperConfig) -> anyhow::Result<LaunchOptions<'static>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(config.request_timeout() * 4)
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create launch options: {}", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let config = Arc::clone(&self.config);
        let browser = blocking(move || {
            let options = Self::launch_options(&config)?;
            Browser::new(options).map_err(|e| anyhow::anyhow!("Failed to launch browser: {}", e))
        })
        .await?;

        tracing::debug!("Launched headless browser");
        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            config: Arc::clone(&self.config),
        }))
    }
}

impl ChromeSession {
    fn browser(&self) -> Result<Browser> {
        self.browser
            .lock()
            .map_err(|_| AppError::Internal("browser lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| AppError::Browser("Session already closed".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let browser = self.browser()?;
        let timeout = self.config.request_timeout();
        let user_agent = self.config.user_agent.clone();

        let tab = blocking(move || {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            tab.set_user_agent(&user_agent, None, None)?;
            Ok(tab)
        })
        .await?;

        Ok(Box::new(ChromePage { tab }))
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| AppError::Internal("browser lock poisoned".to_string()))?
            .take();

        if let Some(browser) = browser {
            // Dropping the last handle kills the Chrome process.
            blocking(move || {
                drop(browser);
                Ok(())
            })
            .await?;
            tracing::debug!("Closed headless browser");
        }
        Ok(())
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let selector = selector.to_string();
        blocking(move || {
            tab.find_element(&selector)?.click()?;
            Ok(())
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let owned = selector.to_string();
        blocking(move || {
            tab.wait_for_element(&owned)?;
            Ok(())
        })
        .await
        .map_err(|_| AppError::ElementNotFound {
            selector: selector.to_string(),
        })
    }

    async fn content(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        blocking(move || tab.get_content()).await
    }

    async fn close(&self) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.close(true)?;
            Ok(())
        })
        .await
    }
}
