//! Job state file.
//!
//! All known jobs are written as one JSON array of tagged records. Loading is
//! lenient: a missing or unreadable file means there is nothing to resume.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::record::JobRecord;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` atomically (temporary file + rename).
    pub async fn serialize(&self, records: &[JobRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            count = records.len(),
            "Job state written"
        );
        Ok(())
    }

    /// Read the state file.
    ///
    /// Entries that do not parse (e.g. an unknown job type) are skipped and
    /// logged; only an unreadable file or a malformed array is an error.
    pub async fn load(&self) -> Result<Vec<JobRecord>> {
        let data = tokio::fs::read(&self.path).await?;
        let entries: Vec<Value> = serde_json::from_slice(&data)?;
        let mut records = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<JobRecord>(entry) {
                Ok(record) => records.push(record),
                Err(e) => error!(
                    path = %self.path.display(),
                    index = idx,
                    error = %e,
                    "Skipping unreadable job record"
                ),
            }
        }
        Ok(records)
    }

    /// Like [`load`](Self::load), but any failure yields an empty list.
    pub async fn load_or_default(&self) -> Vec<JobRecord> {
        match self.load().await {
            Ok(records) => {
                info!(
                    path = %self.path.display(),
                    count = records.len(),
                    "Loaded job state"
                );
                records
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load job state, starting without detached jobs"
                );
                Vec::new()
            }
        }
    }
}
