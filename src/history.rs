use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// ISO-8601 local time.
    pub timestamp: String,
    pub search_term: String,
    pub result_count: usize,
}

/// Append-only JSON array of past searches.
///
/// Every append reads the whole file and rewrites it. There is no protection
/// against a second process writing the same file.
#[derive(Debug, Clone)]
pub struct SearchHistory {
    path: PathBuf,
}

impl SearchHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SearchHistory {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one search. Failures are logged and otherwise ignored.
    pub fn append(&self, search_term: &str, result_count: usize) {
        let entry = HistoryEntry {
            timestamp: Local::now().to_rfc3339(),
            search_term: search_term.to_string(),
            result_count,
        };
        match self.try_append(entry) {
            Ok(total) => info!("Saved search history ({} entries) to {:?}", total, self.path),
            Err(e) => error!("Error saving search history to {:?}: {}", self.path, e),
        }
    }

    fn try_append(&self, entry: HistoryEntry) -> Result<usize, HistoryError> {
        let mut entries = self.entries()?;
        entries.push(entry);

        let json = serde_json::to_string_pretty(&entries)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())?;
        Ok(entries.len())
    }

    /// All recorded entries, oldest first. A missing file reads as empty.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
