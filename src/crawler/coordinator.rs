//! Quota crawl coordinator
//!
//! Drives every source of one category toward the category quota in
//! round-robin sweeps:
//! - each sweep hands every active source a share of the remaining quota
//! - one task per source runs on the crawl worker pool
//! - every candidate passes a single insertion gate, so the first discovery
//!   wins and the quota is never exceeded
//! - the category store is flushed after every batch
//! - a source whose fetch fails sits out the rest of that sweep and is
//!   retried in the next one, until it fails too many sweeps in a row

use crate::config::{Category, Source};
use crate::context::StopSignal;
use crate::crawler::fetcher::FetchError;
use crate::crawler::source::{SourceFetcher, UrlBatches};
use crate::pool::WorkerPool;
use crate::state::CrawlRun;
use crate::storage::{StorageError, StorageResult, UrlStore};
use crate::url::normalize_url;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Sweeps in a row a source may fail before it is dropped from the run
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Result of crawling one category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub category: String,

    /// URLs counted toward the quota at the end of the run
    pub collected: usize,

    /// URLs newly inserted during this run
    pub added: usize,

    /// New URLs per source id
    pub per_source: BTreeMap<String, usize>,

    /// Sources that ran out of candidates or failed
    pub exhausted_sources: Vec<String>,

    /// Last fetch error per source that failed at least once
    pub source_errors: BTreeMap<String, String>,

    pub quota_reached: bool,
    pub interrupted: bool,
}

/// Outcome of offering one candidate to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Inserted,
    Duplicate,
    Invalid,
    QuotaReached,
}

/// Serialized admission of candidates into the URL store
struct InsertionGate {
    category: String,
    quota: usize,
    urls: Arc<dyn UrlStore>,
    /// The coordinator's view of the category count
    count: Mutex<usize>,
}

impl InsertionGate {
    fn offer(&self, candidate: &str, source: &str) -> StorageResult<Offer> {
        let Ok(url) = normalize_url(candidate) else {
            tracing::debug!(source, candidate, "Discarding invalid candidate URL");
            return Ok(Offer::Invalid);
        };

        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count >= self.quota {
            return Ok(Offer::QuotaReached);
        }

        if self.urls.add(&self.category, url.as_str(), source)? {
            *count += 1;
            Ok(Offer::Inserted)
        } else {
            Ok(Offer::Duplicate)
        }
    }

    fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reached(&self) -> bool {
        self.count() >= self.quota
    }

    fn remaining(&self) -> usize {
        self.quota.saturating_sub(self.count())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceState {
    Active,
    Exhausted,
    Failed,
}

/// Per-source cursor, persisting across sweeps
struct SourceCursor {
    source: Source,
    batches: Option<Box<dyn UrlBatches>>,
    state: SourceState,
    added: usize,
    /// Sweeps in a row that ended in a fetch error
    failures: u32,
    last_error: Option<String>,
}

/// Why a source task left its sweep
enum TaskEnd {
    /// Share met, quota reached or stop requested; the source stays active
    Yielded,
    Exhausted,
    Failed(FetchError),
}

struct TaskResult {
    index: usize,
    batches: Box<dyn UrlBatches>,
    added: usize,
    /// Batches fetched without error before the task ended
    fetched: usize,
    end: StorageResult<TaskEnd>,
}

/// Drives the sources of a category toward its quota
pub struct QuotaCoordinator {
    urls: Arc<dyn UrlStore>,
    fetcher: Arc<dyn SourceFetcher>,
    stop: StopSignal,
    run: Arc<Mutex<CrawlRun>>,
}

impl QuotaCoordinator {
    /// Creates a coordinator
    ///
    /// With `resume` the store's existing URLs count toward each quota;
    /// otherwise counting starts at zero and existing URLs only deduplicate.
    pub fn new(
        urls: Arc<dyn UrlStore>,
        fetcher: Arc<dyn SourceFetcher>,
        stop: StopSignal,
        resume: bool,
    ) -> Self {
        Self {
            urls,
            fetcher,
            stop,
            run: Arc::new(Mutex::new(CrawlRun::new(resume))),
        }
    }

    /// Snapshot of the run progress so far
    pub fn progress(&self) -> CrawlRun {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Crawls one category until its quota is reached, every source is
    /// exhausted or failed, or a stop is requested
    ///
    /// Only URL store I/O errors are returned; source failures are recorded
    /// in the summary.
    pub async fn run(&self, category: &Category, max_workers: usize) -> StorageResult<CrawlSummary> {
        let existing = self.urls.count(&category.name);
        let baseline = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .begin_category(&category.name, existing);

        let gate = Arc::new(InsertionGate {
            category: category.name.clone(),
            quota: category.quota,
            urls: Arc::clone(&self.urls),
            count: Mutex::new(baseline),
        });

        tracing::info!(
            category = %category.name,
            quota = category.quota,
            existing,
            counted = baseline,
            sources = category.sources.len(),
            "Starting category crawl"
        );

        let mut cursors: Vec<SourceCursor> = category
            .sources
            .iter()
            .map(|source| SourceCursor {
                source: source.clone(),
                batches: None,
                state: SourceState::Active,
                added: 0,
                failures: 0,
                last_error: None,
            })
            .collect();

        let pool = WorkerPool::new(max_workers);
        let mut sweep = 0u32;

        while !gate.reached() && !self.stop.is_stopped() {
            let active: Vec<usize> = cursors
                .iter()
                .enumerate()
                .filter(|(_, c)| c.state == SourceState::Active)
                .map(|(i, _)| i)
                .collect();

            if active.is_empty() {
                break;
            }

            sweep += 1;
            let share = category
                .min_per_source
                .max(gate.remaining().div_ceil(active.len()));

            tracing::debug!(
                category = %category.name,
                sweep,
                active = active.len(),
                share,
                remaining = gate.remaining(),
                "Starting sweep"
            );

            self.sweep(&category.name, &mut cursors, &active, share, &gate, &pool)
                .await?;
        }

        let interrupted = self.stop.is_stopped() && !gate.reached();
        let summary = summarize(&category.name, &cursors, &gate, interrupted);

        tracing::info!(
            category = %summary.category,
            collected = summary.collected,
            added = summary.added,
            quota_reached = summary.quota_reached,
            exhausted = summary.exhausted_sources.len(),
            failed = summary.source_errors.len(),
            interrupted = summary.interrupted,
            "Category crawl finished"
        );

        Ok(summary)
    }

    /// Runs one task per active source and folds the results back into the cursors
    async fn sweep(
        &self,
        category: &str,
        cursors: &mut [SourceCursor],
        active: &[usize],
        share: usize,
        gate: &Arc<InsertionGate>,
        pool: &WorkerPool,
    ) -> StorageResult<()> {
        let mut tasks = JoinSet::new();

        for &index in active {
            if self.stop.is_stopped() || gate.reached() {
                break;
            }

            let Some(slot) = pool.acquire().await else {
                break;
            };

            let cursor = &mut cursors[index];
            let batches = match cursor.batches.take() {
                Some(batches) => batches,
                None => self.fetcher.open(&cursor.source, category),
            };

            let task = SourceTask {
                index,
                source_id: cursor.source.id.clone(),
                category: category.to_string(),
                share,
                gate: Arc::clone(gate),
                urls: Arc::clone(&self.urls),
                stop: self.stop.clone(),
                run: Arc::clone(&self.run),
            };

            tasks.spawn(async move {
                let result = task.run(batches).await;
                drop(slot);
                result
            });
        }

        let mut storage_error: Option<StorageError> = None;

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(category, error = %e, "Source task panicked");
                    continue;
                }
            };

            let cursor = &mut cursors[result.index];
            cursor.added += result.added;
            cursor.batches = Some(result.batches);
            if result.fetched > 0 {
                cursor.failures = 0;
            }

            match result.end {
                Ok(TaskEnd::Yielded) => {}
                Ok(TaskEnd::Exhausted) => {
                    tracing::info!(category, source = %cursor.source.id, added = cursor.added, "Source exhausted");
                    cursor.state = SourceState::Exhausted;
                    cursor.batches = None;
                }
                Ok(TaskEnd::Failed(e)) => {
                    cursor.failures += 1;
                    cursor.last_error = Some(e.to_string());

                    if cursor.failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::warn!(
                            category,
                            source = %cursor.source.id,
                            failures = cursor.failures,
                            error = %e,
                            "Source unavailable, dropping it from the run"
                        );
                        cursor.state = SourceState::Failed;
                        cursor.batches = None;
                    } else {
                        tracing::warn!(
                            category,
                            source = %cursor.source.id,
                            failures = cursor.failures,
                            error = %e,
                            "Source failed this sweep, retrying next sweep"
                        );
                    }
                }
                Err(e) => {
                    storage_error.get_or_insert(e);
                }
            }
        }

        match storage_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Everything a source task needs, moved into the spawned future
struct SourceTask {
    index: usize,
    source_id: String,
    category: String,
    share: usize,
    gate: Arc<InsertionGate>,
    urls: Arc<dyn UrlStore>,
    stop: StopSignal,
    run: Arc<Mutex<CrawlRun>>,
}

impl SourceTask {
    async fn run(self, mut batches: Box<dyn UrlBatches>) -> TaskResult {
        let mut added = 0usize;
        let mut fetched = 0usize;
        let end = self.pull(&mut batches, &mut added, &mut fetched).await;
        TaskResult {
            index: self.index,
            batches,
            added,
            fetched,
            end,
        }
    }

    async fn pull(
        &self,
        batches: &mut Box<dyn UrlBatches>,
        added: &mut usize,
        fetched: &mut usize,
    ) -> StorageResult<TaskEnd> {
        loop {
            if *added >= self.share || self.gate.reached() || self.stop.is_stopped() {
                return Ok(TaskEnd::Yielded);
            }

            let batch = match batches.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => return Ok(TaskEnd::Exhausted),
                Err(e) => return Ok(TaskEnd::Failed(e)),
            };
            *fetched += 1;

            let mut inserted = 0usize;
            let mut duplicates = 0usize;
            for candidate in &batch {
                match self.gate.offer(candidate, &self.source_id)? {
                    Offer::Inserted => inserted += 1,
                    Offer::Duplicate => duplicates += 1,
                    Offer::Invalid => {}
                    Offer::QuotaReached => break,
                }
            }
            *added += inserted;

            self.urls.flush(&self.category)?;
            self.run
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_batch(&self.category, self.gate.count());

            tracing::debug!(
                category = %self.category,
                source = %self.source_id,
                candidates = batch.len(),
                inserted,
                duplicates,
                collected = self.gate.count(),
                "Processed batch"
            );
        }
    }
}

fn summarize(
    category: &str,
    cursors: &[SourceCursor],
    gate: &InsertionGate,
    interrupted: bool,
) -> CrawlSummary {
    let mut summary = CrawlSummary {
        category: category.to_string(),
        collected: gate.count(),
        quota_reached: gate.reached(),
        interrupted,
        ..Default::default()
    };

    for cursor in cursors {
        summary.added += cursor.added;
        summary
            .per_source
            .insert(cursor.source.id.clone(), cursor.added);

        match &cursor.state {
            SourceState::Active => {}
            SourceState::Exhausted | SourceState::Failed => {
                summary.exhausted_sources.push(cursor.source.id.clone())
            }
        }

        if let Some(message) = &cursor.last_error {
            summary
                .source_errors
                .insert(cursor.source.id.clone(), message.clone());
        }
    }

    summary
}
