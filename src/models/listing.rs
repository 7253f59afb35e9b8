use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A listing found during the current cycle, not yet checked against the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute listing URL; unique per real-world listing.
    pub key: String,
    pub display_text: String,
    pub matches_filter: bool,
}

/// A listing that passed the filter and was persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(rename = "linkUrl")]
    pub key: String,
    #[serde(rename = "linkText")]
    pub display_text: String,
    #[serde(alias = "isDoubleRoom")]
    pub matches_filter: bool,
    /// Channel name to delivered flag.
    #[serde(default)]
    pub notified: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// Fields this version does not know, e.g. `emailSent` from older stores.
    /// Written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Candidate {
    pub fn new(key: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_text: display_text.into(),
            matches_filter: false,
        }
    }

    pub fn with_filter_result(mut self, matches_filter: bool) -> Self {
        self.matches_filter = matches_filter;
        self
    }
}

impl Record {
    /// Every channel starts out undelivered.
    pub fn from_candidate<S: AsRef<str>>(candidate: Candidate, channels: &[S]) -> Self {
        Self {
            key: candidate.key,
            display_text: candidate.display_text,
            matches_filter: candidate.matches_filter,
            notified: channels
                .iter()
                .map(|channel| (channel.as_ref().to_string(), false))
                .collect(),
            first_seen: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    /// Falls back to the `<channel>Sent` flag of older stores.
    pub fn is_notified(&self, channel: &str) -> bool {
        match self.notified.get(channel) {
            Some(flag) => *flag,
            None => self
                .extra
                .get(&format!("{}Sent", channel))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Returns whether the flag changed.
    pub fn mark_notified(&mut self, channel: &str) -> bool {
        let flag = self.notified.entry(channel.to_string()).or_insert(false);
        let changed = !*flag;
        *flag = true;
        changed
    }
}
