// Shared fixtures for the integration tests: an in-memory browser that serves
// canned pages and a transport that records every message it is asked to send.

pub mod poller_tests;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use listing_watcher::browser::{BrowserLauncher, BrowserSession, Page};
use listing_watcher::dom::Document;
use listing_watcher::plugins::{Ack, ChannelTransport};
use listing_watcher::{AppConfig, AppError, Poller, Result};

pub const BASE_URL: &str = "https://www.daft.ie";
pub const LISTING_URL: &str = "https://www.daft.ie/property-for-rent/limerick?numBeds_from=2";

pub fn absolute(href: &str) -> String {
    format!("{}{}", BASE_URL, href)
}

/// Listing page with one result per `(href, address)`.
pub fn listing_page(items: &[(&str, &str)], with_consent: bool) -> String {
    let consent = if with_consent {
        r#"<button data-tracking="cc-accept">Accept</button>"#
    } else {
        ""
    };
    let results: String = items
        .iter()
        .map(|(href, address)| {
            format!(
                r#"<li><a href="{}"><div data-testid="address">
                    {}
                </div></a></li>"#,
                href, address
            )
        })
        .collect();

    format!(
        r#"<html><body>{}<ul data-testid="results">{}</ul></body></html>"#,
        consent, results
    )
}

/// Detail page with one overview entry per `(label, value)`.
pub fn detail_page(entries: &[(&str, &str)]) -> String {
    let entries: String = entries
        .iter()
        .map(|(label, value)| format!("<li><span>{}</span>: {}</li>", label, value))
        .collect();

    format!(
        r#"<html><body><div data-testid="overview"><ul>{}</ul></div></body></html>"#,
        entries
    )
}

#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
}

#[derive(Default)]
pub struct BrowserCounters {
    pub launches: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    site: Arc<Mutex<FakeSite>>,
    pub counters: Arc<BrowserCounters>,
    fail_launch: bool,
}

struct FakeSession {
    site: Arc<Mutex<FakeSite>>,
    counters: Arc<BrowserCounters>,
}

struct FakePage {
    site: Arc<Mutex<FakeSite>>,
    counters: Arc<BrowserCounters>,
    current: Mutex<Option<String>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launch() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, html: String) {
        self.site.lock().unwrap().pages.insert(url.to_string(), html);
    }

    pub fn fail(&self, url: &str) {
        self.site.lock().unwrap().failing.insert(url.to_string());
    }

    pub fn recover(&self, url: &str) {
        self.site.lock().unwrap().failing.remove(url);
    }

    pub fn hang(&self, url: &str) {
        self.site.lock().unwrap().hanging.insert(url.to_string());
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.counters.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(AppError::Browser("Failed to launch browser: no chrome".to_string()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
            current: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakePage {
    fn current_html(&self) -> Result<String> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Browser("No page loaded".to_string()))
    }

    fn has_element(&self, selector: &str) -> Result<bool> {
        let html = self.current_html()?;
        let doc = Document::parse(&html);
        Ok(!doc.query_all(selector)?.is_empty())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.counters.navigations.lock().unwrap().push(url.to_string());

        let (hanging, outcome) = {
            let site = self.site.lock().unwrap();
            let outcome = if site.failing.contains(url) {
                Err(AppError::Browser(format!("net::ERR_CONNECTION_RESET at {}", url)))
            } else {
                site.pages
                    .get(url)
                    .cloned()
                    .ok_or_else(|| AppError::Browser(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))
            };
            (site.hanging.contains(url), outcome)
        };

        if hanging {
            futures::future::pending::<()>().await;
        }

        let html = outcome?;
        *self.current.lock().unwrap() = Some(html);
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if self.has_element(selector)? {
            Ok(())
        } else {
            Err(AppError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<()> {
        self.click(selector).await
    }

    async fn content(&self) -> Result<String> {
        self.current_html()
    }

    async fn close(&self) -> Result<()> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&self, _duration: Duration) {}
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub source_tag: String,
    pub payload: String,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, channel_id: &str) {
        self.failing.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn send(&self, channel_id: &str, source_tag: &str, payload: &str) -> Result<Ack> {
        self.sent.lock().unwrap().push(SentMessage {
            channel_id: channel_id.to_string(),
            source_tag: source_tag.to_string(),
            payload: payload.to_string(),
        });

        if self.failing.lock().unwrap().contains(channel_id) {
            return Err(AppError::Notification {
                channel: channel_id.to_string(),
                message: "listener unavailable".to_string(),
            });
        }

        Ok(Ack {
            channel_id: channel_id.to_string(),
            bytes_sent: payload.len(),
            message_id: None,
        })
    }
}

/// Test configuration: no settle delays, short interval, store under `dir`.
pub fn get_test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.source.listing_url = LISTING_URL.to_string();
    config.source.base_url = BASE_URL.to_string();
    config.scraper.request_timeout = 2;
    config.scraper.consent_settle_ms = 0;
    config.scraper.detail_settle_ms = 0;
    config.poll.interval_ms = 10;
    config.store.path = dir.join("apartments.json");
    config.notifications.app_id = "test".to_string();
    config
}

/// Serves a listing with U1 (two double bedrooms) and U2 (single bedroom).
pub fn two_listing_site() -> FakeBrowser {
    let browser = FakeBrowser::new();
    browser.serve(
        LISTING_URL,
        listing_page(
            &[
                ("/for-rent/apartment-1/111", "1 Henry Street, Limerick"),
                ("/for-rent/apartment-2/222", "2 O'Connell Street, Limerick"),
            ],
            true,
        ),
    );
    browser.serve(
        &absolute("/for-rent/apartment-1/111"),
        detail_page(&[("Double Bedroom", "2"), ("Bathroom", "1")]),
    );
    browser.serve(
        &absolute("/for-rent/apartment-2/222"),
        detail_page(&[("Single Bedroom", "1"), ("Bathroom", "1")]),
    );
    browser
}

pub async fn create_test_poller(
    config: &AppConfig,
    browser: &FakeBrowser,
    transport: &Arc<RecordingTransport>,
) -> anyhow::Result<Poller> {
    let poller = Poller::from_config(
        config,
        Arc::new(browser.clone()),
        Arc::clone(transport) as Arc<dyn ChannelTransport>,
    )?;
    poller.store().initialize().await?;
    Ok(poller)
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}
