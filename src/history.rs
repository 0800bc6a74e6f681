//! Append-only log of completed scans.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How many entries display collaborators show
pub const DISPLAY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub score: u32,
    pub asset_count: usize,
    pub video_count: usize,
}

/// History log, optionally mirrored to a JSON file after every append
#[derive(Debug, Default)]
pub struct AnalysisHistory {
    entries: Vec<AnalysisHistoryEntry>,
    path: Option<PathBuf>,
}

impl AnalysisHistory {
    /// In-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log backed by `path`; a missing file starts an empty log.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let entries = match std::fs::read_to_string(path) {
            Ok(data) if data.trim().is_empty() => Vec::new(),
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| Error::HistoryError(format!("corrupt history {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::HistoryError(format!("Failed to read {}: {}", path.display(), e))),
        };
        Ok(Self { entries, path: Some(path.to_path_buf()) })
    }

    /// Append one entry; if it cannot be persisted the log is left unchanged.
    pub fn append(&mut self, entry: AnalysisHistoryEntry) -> Result<()> {
        self.entries.push(entry);
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[AnalysisHistoryEntry] {
        &self.entries
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<AnalysisHistoryEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::HistoryError(format!("Failed to create {}: {}", dir.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)
            .map_err(|e| Error::HistoryError(format!("Failed to write {}: {}", path.display(), e)))
    }
}
