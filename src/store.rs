//! Append-only JSON file of every listing ever persisted.
//!
//! The whole file is read into memory and rewritten on change. Writes go to a
//! sibling temporary file which is then renamed over the store, so readers
//! never observe a half-written document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{Candidate, Record};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct DedupStore {
    path: PathBuf,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty store if none exists yet. Never touches an existing
    /// file.
    pub async fn initialize(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.write(&[]).await?;
        info!(path = %self.path.display(), "Created empty listing store");
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<Record>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AppError::StoreUnreadable {
                path: self.path.clone(),
                source,
            })?;

        serde_json::from_str(&content).map_err(|source| AppError::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Persists the candidates whose key has not been seen before and returns
    /// exactly those, in input order. The file is only rewritten when at
    /// least one record is new.
    pub async fn reconcile<S: AsRef<str>>(
        &self,
        candidates: Vec<Candidate>,
        channels: &[S],
    ) -> Result<Vec<Record>> {
        let mut records = self.load().await?;
        let mut seen: HashSet<String> = records.iter().map(|r| r.key.clone()).collect();

        let new_records: Vec<Record> = candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.key.clone()))
            .map(|candidate| Record::from_candidate(candidate, channels))
            .collect();

        info!("{} new listing(s) found", new_records.len());

        if !new_records.is_empty() {
            records.extend(new_records.iter().cloned());
            self.write(&records).await?;
        }

        Ok(new_records)
    }

    /// Flags `channel` as delivered on the given keys. Unknown keys are
    /// ignored; returns how many flags changed.
    pub async fn mark_notified<S: AsRef<str>>(&self, keys: &[S], channel: &str) -> Result<usize> {
        let keys: HashSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
        let mut records = self.load().await?;

        let mut changed = 0;
        for record in records.iter_mut().filter(|r| keys.contains(r.key.as_str())) {
            if record.mark_notified(channel) {
                changed += 1;
            }
        }

        if changed > 0 {
            self.write(&records).await?;
        }
        debug!(channel, changed, "Recorded deliveries");
        Ok(changed)
    }

    async fn write(&self, records: &[Record]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "store".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
