use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::extractor::{ValueCondition, ValueSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub scraper: ScraperConfig,
    pub poll: PollSettings,
    pub store: StoreConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Listing page with the search filter already applied.
    pub listing_url: String,
    /// Relative result links are resolved against this.
    pub base_url: String,
    pub selectors: SelectorConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub consent: Option<String>,
    /// Waited on before the listing is read; present even when empty.
    pub results_container: String,
    /// One match per result item.
    pub results: String,
    pub link: String,
    pub link_text: Option<String>,
    pub overview_entry: String,
    pub overview_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub marker_label: String,
    pub condition: ValueCondition,
    pub value_source: ValueSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub headless: bool,
    /// Seconds allowed for any single browser operation.
    pub request_timeout: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub detail_concurrency: usize,
    pub consent_settle_ms: u64,
    pub detail_settle_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub app_id: String,
    pub source_tag: String,
    pub channels: Vec<String>,
    pub send_timeout_ms: u64,
    pub record_deliveries: bool,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    UnixSocket { socket_dir: PathBuf },
    Webhook { base_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                listing_url: "https://www.daft.ie/property-for-rent/limerick-city-centre-limerick?rentalPrice_to=1000&numBeds_from=2&sort=publishDateDesc&rentalPrice_from=500".to_string(),
                base_url: "https://www.daft.ie".to_string(),
                selectors: SelectorConfig {
                    consent: Some("button[data-tracking=cc-accept]".to_string()),
                    results_container: "[data-testid=results]".to_string(),
                    results: "[data-testid=results] > li".to_string(),
                    link: "a".to_string(),
                    link_text: Some("[data-testid=address]".to_string()),
                    overview_entry: "[data-testid=overview] > ul > li".to_string(),
                    overview_label: "span".to_string(),
                },
                filter: FilterConfig {
                    marker_label: "Double Bedroom".to_string(),
                    condition: ValueCondition::Contains { value: "2".to_string() },
                    value_source: ValueSource::MatchedEntry,
                },
            },
            scraper: ScraperConfig {
                headless: true,
                request_timeout: 30,
                user_agent: "ListingWatcher/1.0".to_string(),
                chrome_path: None,
                detail_concurrency: 1,
                consent_settle_ms: 1000,
                detail_settle_ms: 2000,
                window_width: 1800,
                window_height: 900,
            },
            poll: PollSettings { interval_ms: 30_000 },
            store: StoreConfig {
                path: PathBuf::from("./apartments.json"),
            },
            notifications: NotificationsConfig {
                app_id: String::new(),
                source_tag: "screenScraper".to_string(),
                channels: vec!["email".to_string(), "sms".to_string()],
                send_timeout_ms: 10_000,
                record_deliveries: false,
                transport: TransportConfig::UnixSocket {
                    socket_dir: std::env::temp_dir(),
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: None,
            },
        }
    }
}

impl AppConfig {
    /// Layers built-in defaults, an optional config file and `WATCHER__*`
    /// environment variables. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config/default").required(false),
        };

        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("WATCHER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notifications.channels"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = std::env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.source.listing_url).is_err() {
            return Err(ConfigError::Message("Invalid source.listing_url format".into()));
        }

        if Url::parse(&self.source.base_url).is_err() {
            return Err(ConfigError::Message("Invalid source.base_url format".into()));
        }

        let selectors = &self.source.selectors;
        let mut all_selectors = vec![
            &selectors.results_container,
            &selectors.results,
            &selectors.link,
            &selectors.overview_entry,
            &selectors.overview_label,
        ];
        all_selectors.extend(selectors.consent.as_ref());
        all_selectors.extend(selectors.link_text.as_ref());
        for selector in all_selectors {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!("Invalid CSS selector: {}", selector)));
            }
        }

        if self.source.filter.marker_label.trim().is_empty() {
            return Err(ConfigError::Message("Filter marker_label must not be empty".into()));
        }

        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.detail_concurrency == 0 {
            return Err(ConfigError::Message("Scraper detail_concurrency must be greater than 0".into()));
        }

        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Message("Poll interval_ms must be greater than 0".into()));
        }

        if self.notifications.channels.is_empty() {
            return Err(ConfigError::Message("At least one notification channel is required".into()));
        }

        let mut seen = HashSet::new();
        for channel in &self.notifications.channels {
            if channel.trim().is_empty() {
                return Err(ConfigError::Message("Notification channel names must not be empty".into()));
            }
            if !seen.insert(channel.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate notification channel: {}", channel)));
            }
        }

        if self.notifications.send_timeout_ms == 0 {
            return Err(ConfigError::Message("Notification send_timeout_ms must be greater than 0".into()));
        }

        if let TransportConfig::Webhook { base_url } = &self.notifications.transport {
            if Url::parse(base_url).is_err() {
                return Err(ConfigError::Message("Invalid webhook base_url format".into()));
            }
        }

        Ok(())
    }
}

impl ScraperConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl NotificationsConfig {
    /// Listener address for a channel, e.g. `myappemailListener`.
    pub fn channel_id(&self, channel: &str) -> String {
        format!("{}{}Listener", self.app_id, channel)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
