//! Storage traits and error types
//!
//! This module defines the trait interface for the three stores and the
//! associated error types. Implementations synchronize internally so they can
//! be shared as `Arc<dyn ...>` between tasks; no implementation may hold a
//! lock across an `.await`.

use crate::state::CheckpointStatus;
use crate::storage::{ArticleRecord, CheckpointEntry, StatusCounts, UrlRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid checkpoint transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: CheckpointStatus,
        to: CheckpointStatus,
    },

    #[error("URL not in checkpoint: {0}")]
    UnknownUrl(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent, per-category set of discovered URLs
///
/// A URL is a member of at most one category. Adding a URL that is already
/// known anywhere is a no-op and keeps the provenance of the first discovery.
pub trait UrlStore: Send + Sync {
    /// Adds a URL to a category, returning whether it was newly inserted
    fn add(&self, category: &str, url: &str, source: &str) -> StorageResult<bool>;

    /// Number of URLs stored for a category
    fn count(&self, category: &str) -> usize;

    /// Snapshot of a category's URLs in insertion order
    fn all_urls(&self, category: &str) -> Vec<UrlRecord>;

    /// Returns the category owning `url`, if any
    fn category_of(&self, url: &str) -> Option<String>;

    /// Persists a category's URLs
    fn flush(&self, category: &str) -> StorageResult<()>;

    /// Makes sure a (possibly empty) category exists on disk
    fn ensure_category(&self, category: &str) -> StorageResult<()>;

    /// Every category known to the store, sorted
    fn categories(&self) -> Vec<String>;
}

/// Persistent per-URL extraction status
pub trait CheckpointStore: Send + Sync {
    /// Snapshot of every entry
    fn load(&self) -> BTreeMap<String, CheckpointEntry>;

    /// Returns the entry for one URL
    fn entry(&self, url: &str) -> Option<CheckpointEntry>;

    /// Claims a URL for a worker, creating a pending entry first if needed
    fn mark_in_progress(&self, url: &str) -> StorageResult<()>;

    /// Records a successful extraction
    fn mark_success(&self, url: &str) -> StorageResult<()>;

    /// Records a failed attempt
    ///
    /// Increments the retry counter. A retryable failure returns the URL to
    /// `Pending`; otherwise it becomes permanently `Failed`. Returns the
    /// updated entry.
    fn mark_failed(&self, url: &str, retryable: bool, error: &str)
        -> StorageResult<CheckpointEntry>;

    /// Forgets every entry and persists the empty checkpoint
    fn reset(&self) -> StorageResult<()>;

    /// Persists the checkpoint
    fn flush(&self) -> StorageResult<()>;

    /// True if the checkpoint file was unreadable at load and set aside
    fn recovered(&self) -> bool;

    /// Counts entries per status, optionally restricted to a set of URLs
    ///
    /// URLs without an entry count as pending.
    fn counts(&self, urls: Option<&[String]>) -> StatusCounts;
}

/// Destination for extracted articles
pub trait ArticleStore: Send + Sync {
    /// Saves an article, returning where it was written
    fn save(&self, article: &ArticleRecord) -> StorageResult<PathBuf>;

    /// Number of articles saved for a category
    fn count(&self, category: &str) -> StorageResult<usize>;

    /// Makes sure a category's article directory exists
    fn ensure_category(&self, category: &str) -> StorageResult<()>;
}
