use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserSession, Page};
use crate::config::{FilterConfig, ScraperConfig, SelectorConfig, SourceConfig};
use crate::dom::Document;
use crate::models::Candidate;
use crate::utils::error::{AppError, Result};

/// Test applied to the value of an overview entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueCondition {
    Contains { value: String },
    /// First integer in the value is at least `count`.
    AtLeast { count: u32 },
}

/// Which overview entry's value is tested once a label matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    MatchedEntry,
    /// Full text of the first overview entry, whatever its label.
    FirstEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewEntry {
    pub label: String,
    pub value: String,
    /// Whole entry text, label included.
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DetailPredicate {
    pub marker_label: String,
    pub condition: ValueCondition,
    pub value_source: ValueSource,
}

/// Result of one list + detail pass, in listing order.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    /// Candidates dropped because their detail page could not be read.
    pub skipped: usize,
}

pub struct Extractor {
    listing_url: String,
    base_url: Url,
    selectors: SelectorConfig,
    predicate: DetailPredicate,
    timeout: Duration,
    consent_settle: Duration,
    detail_settle: Duration,
    detail_concurrency: usize,
}

fn first_integer(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse().ok())
}

impl ValueCondition {
    pub fn is_satisfied_by(&self, value: &str) -> bool {
        match self {
            ValueCondition::Contains { value: needle } => value.contains(needle.as_str()),
            ValueCondition::AtLeast { count } => first_integer(value).is_some_and(|n| n >= *count),
        }
    }
}

impl DetailPredicate {
    pub fn from_config(filter: &FilterConfig) -> Self {
        Self {
            marker_label: filter.marker_label.clone(),
            condition: filter.condition.clone(),
            value_source: filter.value_source,
        }
    }

    /// False when no entry carries the marker label.
    pub fn evaluate(&self, entries: &[OverviewEntry]) -> bool {
        let mut matched = entries
            .iter()
            .filter(|entry| entry.label.contains(self.marker_label.as_str()));

        match self.value_source {
            ValueSource::MatchedEntry => {
                matched.any(|entry| self.condition.is_satisfied_by(&entry.value))
            }
            ValueSource::FirstEntry => {
                matched.next().is_some()
                    && entries
                        .first()
                        .is_some_and(|first| self.condition.is_satisfied_by(&first.text))
            }
        }
    }
}

impl Extraction {
    pub fn listed(&self) -> usize {
        self.candidates.len() + self.skipped
    }

    pub fn into_matching(self) -> Vec<Candidate> {
        Extractor::retain_matching(self.candidates)
    }
}

impl Extractor {
    pub fn new(source: &SourceConfig, scraper: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            listing_url: source.listing_url.clone(),
            base_url: Url::parse(&source.base_url)?,
            selectors: source.selectors.clone(),
            predicate: DetailPredicate::from_config(&source.filter),
            timeout: scraper.request_timeout(),
            consent_settle: Duration::from_millis(scraper.consent_settle_ms),
            detail_settle: Duration::from_millis(scraper.detail_settle_ms),
            detail_concurrency: scraper.detail_concurrency.max(1),
        })
    }

    pub fn predicate(&self) -> &DetailPredicate {
        &self.predicate
    }

    /// Runs both phases against `session`.
    pub async fn extract(&self, session: &dyn BrowserSession) -> Result<Extraction> {
        let listed = self.list_candidates(session).await?;
        info!(count = listed.len(), "Found listing candidates");

        let extraction = self.evaluate_candidates(session, listed).await;
        info!(
            matching = extraction.candidates.iter().filter(|c| c.matches_filter).count(),
            skipped = extraction.skipped,
            "Evaluated candidate detail pages"
        );
        Ok(extraction)
    }

    /// List phase. Any failure here abandons the cycle.
    pub async fn list_candidates(&self, session: &dyn BrowserSession) -> Result<Vec<Candidate>> {
        let page = self.bounded("open listing page", session.new_page()).await?;
        let result = self.read_listing(page.as_ref()).await;
        self.close_page(page.as_ref()).await;
        result
    }

    async fn read_listing(&self, page: &dyn Page) -> Result<Vec<Candidate>> {
        self.bounded(&format!("navigate {}", self.listing_url), page.navigate(&self.listing_url))
            .await?;

        if let Some(consent) = &self.selectors.consent {
            match self.bounded("accept consent prompt", page.click(consent)).await {
                Ok(()) => debug!("Accepted consent prompt"),
                Err(e) => debug!(error = %e, "No consent prompt accepted"),
            }
        }
        page.wait(self.consent_settle).await;

        self.bounded("wait for results", page.wait_for_selector(&self.selectors.results_container))
            .await?;
        let html = self.bounded("read listing page", page.content()).await?;
        self.parse_listing(&html)
    }

    /// Detail phase. Candidates whose page fails are dropped and counted.
    pub async fn evaluate_candidates(
        &self,
        session: &dyn BrowserSession,
        candidates: Vec<Candidate>,
    ) -> Extraction {
        let results: Vec<(Candidate, Result<bool>)> =
            stream::iter(candidates.into_iter().map(|candidate| async move {
                let result = self.check_detail(session, &candidate.key).await;
                (candidate, result)
            }))
            .buffered(self.detail_concurrency)
            .collect()
            .await;

        let mut extraction = Extraction::default();
        for (candidate, result) in results {
            match result {
                Ok(matches) => extraction.candidates.push(candidate.with_filter_result(matches)),
                Err(e) => {
                    warn!(url = %candidate.key, error = %e, "Skipping candidate, detail page failed");
                    extraction.skipped += 1;
                }
            }
        }
        extraction
    }

    pub async fn check_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<bool> {
        let page = self.bounded("open detail page", session.new_page()).await?;

        let result: Result<bool> = async {
            self.bounded(&format!("navigate {}", url), page.navigate(url)).await?;
            page.wait(self.detail_settle).await;
            let html = self.bounded("read detail page", page.content()).await?;
            let entries = self.parse_overview(&html)?;
            Ok(self.predicate.evaluate(&entries))
        }
        .await;

        self.close_page(page.as_ref()).await;

        if let Ok(matches) = result {
            debug!(url, matches, "Checked detail page");
        }
        result
    }

    pub fn parse_listing(&self, html: &str) -> Result<Vec<Candidate>> {
        let doc = Document::parse(html);
        let mut candidates = Vec::new();

        for (index, item) in doc.query_all(&self.selectors.results)?.into_iter().enumerate() {
            let Some(link) = item.query_first(&self.selectors.link)? else {
                warn!(index, "Result item has no link, skipping");
                continue;
            };
            let Some(href) = doc.read_attribute(link, "href") else {
                warn!(index, "Result link has no href, skipping");
                continue;
            };
            let url = match self.base_url.join(href.trim()) {
                Ok(url) => url,
                Err(e) => {
                    warn!(index, href = %href, error = %e, "Unresolvable result link, skipping");
                    continue;
                }
            };

            let label = match &self.selectors.link_text {
                Some(selector) => link.query_first(selector)?.unwrap_or(link),
                None => link,
            };
            let text = doc.read_text(label).trim().to_string();

            candidates.push(Candidate::new(url.to_string(), text));
        }

        Ok(candidates)
    }

    pub fn parse_overview(&self, html: &str) -> Result<Vec<OverviewEntry>> {
        let doc = Document::parse(html);
        let mut entries = Vec::new();

        for entry in doc.query_all(&self.selectors.overview_entry)? {
            let text = doc.read_text(entry);
            let label = entry
                .query_first(&self.selectors.overview_label)?
                .map(|label| label.text())
                .unwrap_or_default();

            let value = if label.is_empty() {
                text.clone()
            } else {
                text.replacen(&label, "", 1)
            };

            entries.push(OverviewEntry {
                label: label.trim().to_string(),
                value: value.trim().trim_start_matches(':').trim().to_string(),
                text: text.trim().to_string(),
            });
        }

        Ok(entries)
    }

    pub fn retain_matching(candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.into_iter().filter(|c| c.matches_filter).collect()
    }

    async fn close_page(&self, page: &dyn Page) {
        if let Err(e) = self.bounded("close page", page.close()).await {
            debug!(error = %e, "Failed to close page");
        }
    }

    async fn bounded<T>(&self, operation: &str, future: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                operation: operation.to_string(),
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }
}
