//! JSON file backed checkpoint store
//!
//! The checkpoint maps every URL the pipeline has touched to its extraction
//! status. Terminal transitions are persisted immediately; claims are batched
//! and persisted every `flush_interval` writes.

use crate::state::CheckpointStatus;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use crate::storage::{write_json_atomic, CheckpointEntry, StatusCounts};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, CheckpointEntry>,
    /// Writes since the last flush
    unflushed: usize,
}

/// Checkpoint persisted as a single JSON object
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    flush_interval: usize,
    recovered: bool,
    inner: Mutex<Inner>,
}

impl JsonCheckpointStore {
    /// Opens the checkpoint at `path`
    ///
    /// A missing file is an empty checkpoint. An unreadable file is copied to
    /// `<path>.corrupt-<unix-ts>` and the store starts empty, with
    /// [`CheckpointStore::recovered`] reporting true.
    pub fn open(path: &Path, flush_interval: usize) -> StorageResult<Self> {
        let mut recovered = false;

        let entries = match std::fs::read(path) {
            Ok(content) => match serde_json::from_slice::<BTreeMap<String, CheckpointEntry>>(&content)
            {
                Ok(entries) => entries,
                Err(e) => {
                    let backup = corrupt_backup_path(path);
                    std::fs::copy(path, &backup).map_err(|e| StorageError::io(&backup, e))?;
                    tracing::warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "Checkpoint file is corrupted; treating every URL as pending"
                    );
                    recovered = true;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        let interrupted = entries
            .values()
            .filter(|e| e.status == CheckpointStatus::InProgress)
            .count();
        if interrupted > 0 {
            tracing::info!(
                interrupted,
                "Found URLs left in progress by a previous run; they will be retried"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            flush_interval: flush_interval.max(1),
            recovered,
            inner: Mutex::new(Inner {
                entries,
                unflushed: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, inner: &mut Inner) -> StorageResult<()> {
        write_json_atomic(&self.path, &inner.entries)?;
        inner.unflushed = 0;
        Ok(())
    }

    /// Moves `url` to `to`, returning the updated entry
    fn transition(
        inner: &mut Inner,
        url: &str,
        to: CheckpointStatus,
        apply: impl FnOnce(&mut CheckpointEntry),
    ) -> StorageResult<CheckpointEntry> {
        let entry = inner
            .entries
            .get_mut(url)
            .ok_or_else(|| StorageError::UnknownUrl(url.to_string()))?;

        if !entry.status.can_transition_to(to) {
            return Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from: entry.status,
                to,
            });
        }

        entry.status = to;
        apply(entry);
        inner.unflushed += 1;
        Ok(entry.clone())
    }
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", Utc::now().timestamp()));
    PathBuf::from(name)
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> BTreeMap<String, CheckpointEntry> {
        self.lock().entries.clone()
    }

    fn entry(&self, url: &str) -> Option<CheckpointEntry> {
        self.lock().entries.get(url).cloned()
    }

    fn mark_in_progress(&self, url: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        inner
            .entries
            .entry(url.to_string())
            .or_insert_with(CheckpointEntry::pending);

        Self::transition(&mut inner, url, CheckpointStatus::InProgress, |e| {
            e.last_attempt = Some(Utc::now());
        })?;

        if inner.unflushed >= self.flush_interval {
            self.write(&mut inner)?;
        }
        Ok(())
    }

    fn mark_success(&self, url: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, url, CheckpointStatus::Success, |e| {
            e.error = None;
        })?;
        self.write(&mut inner)
    }

    fn mark_failed(
        &self,
        url: &str,
        retryable: bool,
        error: &str,
    ) -> StorageResult<CheckpointEntry> {
        let to = if retryable {
            CheckpointStatus::Pending
        } else {
            CheckpointStatus::Failed
        };

        let mut inner = self.lock();
        let entry = Self::transition(&mut inner, url, to, |e| {
            e.retry_count += 1;
            e.error = Some(error.to_string());
        })?;

        if to.is_terminal() || inner.unflushed >= self.flush_interval {
            self.write(&mut inner)?;
        }
        Ok(entry)
    }

    fn reset(&self) -> StorageResult<()> {
        let mut inner = self.lock();
        let cleared = inner.entries.len();
        inner.entries.clear();
        self.write(&mut inner)?;
        tracing::info!(cleared, "Checkpoint reset");
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut inner = self.lock();
        self.write(&mut inner)
    }

    fn recovered(&self) -> bool {
        self.recovered
    }

    fn counts(&self, urls: Option<&[String]>) -> StatusCounts {
        let inner = self.lock();
        let mut counts = StatusCounts::default();

        match urls {
            Some(urls) => {
                for url in urls {
                    let status = inner
                        .entries
                        .get(url)
                        .map(|e| e.status)
                        .unwrap_or(CheckpointStatus::Pending);
                    counts.record(status);
                }
            }
            None => {
                for entry in inner.entries.values() {
                    counts.record(entry.status);
                }
            }
        }

        counts
    }
}
