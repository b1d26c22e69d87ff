//! JSON file backed URL store
//!
//! One file per category holding an array of `{url, source, discoveredAt}`.

use crate::storage::traits::{StorageError, StorageResult, UrlStore};
use crate::storage::{write_json_atomic, UrlRecord};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Source recorded for URLs imported from a plain string array
pub const UNKNOWN_SOURCE: &str = "unknown";

/// One element of a URL file, in either the current or the legacy layout
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredUrl {
    Record(UrlRecord),
    Plain(String),
}

#[derive(Debug, Default)]
struct CategoryUrls {
    records: Vec<UrlRecord>,
    dirty: bool,
}

#[derive(Debug, Default)]
struct Inner {
    categories: BTreeMap<String, CategoryUrls>,
    /// url -> owning category, across all categories
    owner: HashMap<String, String>,
}

/// URL store persisted as `<dir>/<category>.json`
#[derive(Debug)]
pub struct JsonUrlStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonUrlStore {
    /// Opens the store, loading every category file found in `dir`
    ///
    /// A missing directory is an empty store. A URL listed by more than one
    /// file is kept by the first category in name order.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let mut inner = Inner::default();

        if dir.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
                let path = entry.map_err(|e| StorageError::io(dir, e))?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(path);
                }
            }
            files.sort();

            for path in files {
                let Some(category) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let category = category.to_string();
                let stored = read_url_file(&path)?;
                load_category(&mut inner, &category, stored);
            }
        }

        let total: usize = inner.categories.values().map(|c| c.records.len()).sum();
        tracing::debug!(
            dir = %dir.display(),
            categories = inner.categories.len(),
            urls = total,
            "Loaded URL store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn category_path(&self, category: &str) -> PathBuf {
        self.dir.join(format!("{}.json", category))
    }
}

fn read_url_file(path: &Path) -> StorageResult<Vec<StoredUrl>> {
    let content = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&content).map_err(|e| StorageError::json(path, e))
}

fn load_category(inner: &mut Inner, category: &str, stored: Vec<StoredUrl>) {
    let mut skipped = 0usize;
    let mut records = Vec::with_capacity(stored.len());

    for item in stored {
        let mut record = match item {
            StoredUrl::Record(record) => record,
            StoredUrl::Plain(url) => UrlRecord {
                url,
                category: String::new(),
                source: UNKNOWN_SOURCE.to_string(),
                discovered_at: None,
            },
        };

        if inner.owner.contains_key(&record.url) {
            skipped += 1;
            continue;
        }

        record.category = category.to_string();
        inner
            .owner
            .insert(record.url.clone(), category.to_string());
        records.push(record);
    }

    if skipped > 0 {
        tracing::warn!(category, skipped, "Dropped duplicate URLs while loading store");
    }

    inner.categories.insert(
        category.to_string(),
        CategoryUrls {
            records,
            dirty: skipped > 0,
        },
    );
}

impl UrlStore for JsonUrlStore {
    fn add(&self, category: &str, url: &str, source: &str) -> StorageResult<bool> {
        let mut inner = self.lock();
        if inner.owner.contains_key(url) {
            return Ok(false);
        }

        inner.owner.insert(url.to_string(), category.to_string());
        let urls = inner.categories.entry(category.to_string()).or_default();
        urls.records.push(UrlRecord {
            url: url.to_string(),
            category: category.to_string(),
            source: source.to_string(),
            discovered_at: Some(Utc::now()),
        });
        urls.dirty = true;
        Ok(true)
    }

    fn count(&self, category: &str) -> usize {
        self.lock()
            .categories
            .get(category)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    fn all_urls(&self, category: &str) -> Vec<UrlRecord> {
        self.lock()
            .categories
            .get(category)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    fn category_of(&self, url: &str) -> Option<String> {
        self.lock().owner.get(url).cloned()
    }

    fn flush(&self, category: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        let Some(urls) = inner.categories.get_mut(category) else {
            return Ok(());
        };
        if !urls.dirty {
            return Ok(());
        }

        write_json_atomic(&self.category_path(category), &urls.records)?;
        urls.dirty = false;
        tracing::trace!(category, urls = urls.records.len(), "Flushed URL store");
        Ok(())
    }

    fn ensure_category(&self, category: &str) -> StorageResult<()> {
        let path = self.category_path(category);
        let mut inner = self.lock();
        let urls = inner.categories.entry(category.to_string()).or_default();
        if !path.exists() || urls.dirty {
            write_json_atomic(&path, &urls.records)?;
            urls.dirty = false;
        }
        Ok(())
    }

    fn categories(&self) -> Vec<String> {
        self.lock().categories.keys().cloned().collect()
    }
}
