//! Storage module for persisting harvest data
//!
//! This module handles every on-disk file the harvester owns:
//! - Per-category URL stores (`<output>/urls/<category>.json`)
//! - The extraction checkpoint (`<output>/checkpoint.json`)
//! - Extracted articles (`<output>/articles/<category>/<id>.json`)
//!
//! All writes go through [`write_json_atomic`] so a crash never leaves a
//! half-written file behind.

mod articles;
mod checkpoint;
mod traits;
mod url_store;

pub use articles::JsonArticleStore;
pub use checkpoint::JsonCheckpointStore;
pub use traits::{ArticleStore, CheckpointStore, StorageError, StorageResult, UrlStore};
pub use url_store::JsonUrlStore;

use crate::state::CheckpointStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory layout under the output root
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn urls_dir(&self) -> PathBuf {
        self.root.join("urls")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.root.join("articles")
    }
}

/// A discovered URL with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub url: String,

    /// Owning category (implied by the file the record lives in)
    #[serde(skip)]
    pub category: String,

    /// Source id that first discovered the URL
    pub source: String,

    /// `None` for records imported from a legacy plain-string file
    #[serde(default)]
    pub discovered_at: Option<DateTime<Utc>>,
}

/// Extraction status of one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEntry {
    pub status: CheckpointStatus,

    /// Failed attempts so far
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckpointEntry {
    pub fn pending() -> Self {
        Self {
            status: CheckpointStatus::Pending,
            retry_count: 0,
            last_attempt: None,
            error: None,
        }
    }
}

/// An extracted article, produced only by a successful extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub url: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub extracted_at: DateTime<Utc>,

    /// Domain the article was fetched from
    pub source: String,

    /// Name of the scraper that produced the record
    pub extractor: String,
}

/// Number of checkpoint entries in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub success: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: CheckpointStatus) {
        match status {
            CheckpointStatus::Pending => self.pending += 1,
            CheckpointStatus::InProgress => self.in_progress += 1,
            CheckpointStatus::Success => self.success += 1,
            CheckpointStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.success + self.failed
    }

    /// Share of finished URLs that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let finished = self.success + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.success as f64 * 100.0 / finished as f64
        }
    }
}

/// Serializes `value` as pretty JSON and replaces `path` atomically
///
/// The content is written to a sibling temp file first and then renamed over
/// the target, so readers see either the old or the new file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let content = serde_json::to_vec_pretty(value).map_err(|e| StorageError::json(path, e))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content).map_err(|e| StorageError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}
