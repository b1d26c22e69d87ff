//! Checkpointed extraction pipeline
//!
//! Work is processed in passes. A pass admits every queued URL through the
//! worker pool; URLs that fail transiently and still have retries left are
//! queued for the next pass, which starts after the configured retry delay.

use crate::config::{ExtractorSettings, HttpSettings, UserAgentConfig};
use crate::context::StopSignal;
use crate::crawler::Session;
use crate::extract::registry::CapabilityRegistry;
use crate::extract::scrapers::ScrapeError;
use crate::pool::{Slot, WorkerPool};
use crate::storage::{ArticleStore, CheckpointStore, StorageError, UrlStore};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

/// Per-category extraction counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport {
    /// URLs queued in the first pass
    pub queued: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Outcome of an extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub success: usize,

    /// URLs that became permanently failed during this run
    pub failed: usize,

    /// URLs already Success or Failed before the run started
    pub skipped: usize,

    /// Requeues after transient failures
    pub retried: usize,

    pub interrupted: bool,
    pub per_category: BTreeMap<String, CategoryReport>,

    /// The checkpoint file was unreadable and has been set aside
    pub checkpoint_recovered: bool,

    /// Last error per permanently failed URL
    pub errors: BTreeMap<String, String>,

    /// Highest number of URLs extracted at once
    pub peak_concurrency: usize,
}

#[derive(Debug, Clone)]
struct WorkItem {
    category: String,
    url: String,
}

enum Outcome {
    Success,
    Requeue,
    Failed(String),
}

struct Completed {
    item: WorkItem,
    outcome: Result<Outcome, StorageError>,
}

/// Per-category counters of finished URLs, used for progress lines
struct Progress {
    interval: usize,
    per_category: HashMap<String, (AtomicUsize, usize)>,
}

impl Progress {
    fn record(&self, category: &str) {
        let Some((done, total)) = self.per_category.get(category) else {
            return;
        };
        let done = done.fetch_add(1, Ordering::SeqCst) + 1;
        if done % self.interval == 0 || done == *total {
            tracing::info!(category, done, total = *total, "Extraction progress");
        }
    }
}

/// Shared state of the workers
struct Workers {
    checkpoint: Arc<dyn CheckpointStore>,
    articles: Arc<dyn ArticleStore>,
    registry: Arc<CapabilityRegistry>,
    max_retries: u32,
    progress: Progress,
}

impl Workers {
    async fn process(&self, item: &WorkItem, session: &Session) -> Result<Outcome, StorageError> {
        self.checkpoint.mark_in_progress(&item.url)?;

        let result = match Url::parse(&item.url) {
            Ok(url) => {
                let capability = self.registry.resolve(&url);
                match capability.scrape(session, &url, &item.category).await {
                    Ok(article) => self
                        .articles
                        .save(&article)
                        .map(|_| ())
                        .map_err(|e| ScrapeError::Store(e.to_string())),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(ScrapeError::InvalidUrl(format!("{}: {}", item.url, e))),
        };

        let outcome = match result {
            Ok(()) => {
                self.checkpoint.mark_success(&item.url)?;
                self.progress.record(&item.category);
                Outcome::Success
            }
            Err(e) => {
                let attempts = self
                    .checkpoint
                    .entry(&item.url)
                    .map(|entry| entry.retry_count)
                    .unwrap_or(0)
                    + 1;
                let retry = e.is_retryable() && attempts <= self.max_retries;

                self.checkpoint.mark_failed(&item.url, retry, &e.to_string())?;

                if retry {
                    tracing::debug!(url = %item.url, attempt = attempts, error = %e, "Transient failure, will retry");
                    Outcome::Requeue
                } else {
                    tracing::warn!(url = %item.url, error = %e, "Extraction failed");
                    self.progress.record(&item.category);
                    Outcome::Failed(e.to_string())
                }
            }
        };

        Ok(outcome)
    }
}

/// Extracts articles for every URL in the URL store not yet finished
pub struct ExtractionPipeline {
    urls: Arc<dyn UrlStore>,
    checkpoint: Arc<dyn CheckpointStore>,
    articles: Arc<dyn ArticleStore>,
    registry: Arc<CapabilityRegistry>,
    stop: StopSignal,
    settings: ExtractorSettings,
    user_agent: UserAgentConfig,
    http: HttpSettings,
}

impl ExtractionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        urls: Arc<dyn UrlStore>,
        checkpoint: Arc<dyn CheckpointStore>,
        articles: Arc<dyn ArticleStore>,
        registry: Arc<CapabilityRegistry>,
        stop: StopSignal,
        settings: ExtractorSettings,
        user_agent: UserAgentConfig,
        http: HttpSettings,
    ) -> Self {
        Self {
            urls,
            checkpoint,
            articles,
            registry,
            stop,
            settings,
            user_agent,
            http,
        }
    }

    /// Runs extraction over `categories`
    ///
    /// Each worker slot owns its own HTTP session. Only checkpoint I/O errors
    /// abort the run; per-URL failures are recorded in the report.
    pub async fn run(
        &self,
        categories: &[String],
        max_workers: usize,
        max_retries: u32,
    ) -> crate::Result<ExtractionReport> {
        let pool = WorkerPool::try_build(max_workers.max(1), |id| {
            Session::build(id, &self.user_agent, &self.http)
        })?;

        let mut report = ExtractionReport {
            checkpoint_recovered: self.checkpoint.recovered(),
            ..Default::default()
        };

        let mut queue = VecDeque::new();
        let mut totals = HashMap::new();

        for category in categories {
            let category_report = report.per_category.entry(category.clone()).or_default();

            for record in self.urls.all_urls(category) {
                let finished = self
                    .checkpoint
                    .entry(&record.url)
                    .map(|e| e.status.is_terminal())
                    .unwrap_or(false);

                if finished {
                    category_report.skipped += 1;
                    report.skipped += 1;
                } else {
                    category_report.queued += 1;
                    queue.push_back(WorkItem {
                        category: category.clone(),
                        url: record.url,
                    });
                }
            }

            totals.insert(category.clone(), (AtomicUsize::new(0), category_report.queued));
        }

        tracing::info!(
            categories = categories.len(),
            queued = queue.len(),
            skipped = report.skipped,
            workers = pool.size(),
            max_retries,
            recovered = report.checkpoint_recovered,
            "Starting extraction"
        );

        let workers = Arc::new(Workers {
            checkpoint: Arc::clone(&self.checkpoint),
            articles: Arc::clone(&self.articles),
            registry: Arc::clone(&self.registry),
            max_retries,
            progress: Progress {
                interval: self.settings.progress_interval.max(1),
                per_category: totals,
            },
        });

        let mut pass = 0u32;
        while !queue.is_empty() {
            if pass > 0 && !self.retry_delay().await {
                report.interrupted = true;
                break;
            }
            pass += 1;

            tracing::debug!(pass, queued = queue.len(), "Starting extraction pass");

            let (next, stopped) = self.run_pass(&workers, &pool, &mut queue, &mut report).await?;
            self.checkpoint.flush()?;

            if stopped {
                report.interrupted = true;
                break;
            }
            queue = next;
        }

        report.peak_concurrency = pool.peak();

        tracing::info!(
            success = report.success,
            failed = report.failed,
            skipped = report.skipped,
            retried = report.retried,
            interrupted = report.interrupted,
            passes = pass,
            "Extraction finished"
        );

        Ok(report)
    }

    /// Waits out the retry delay; returns false if a stop arrived meanwhile
    async fn retry_delay(&self) -> bool {
        let delay = Duration::from_millis(self.settings.retry_delay_ms);
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.stop.is_stopped(),
            _ = self.stop.stopped() => false,
        }
    }

    /// Admits the queue through the pool and waits for every admitted URL
    ///
    /// Returns the retry queue and whether admission stopped early.
    async fn run_pass(
        &self,
        workers: &Arc<Workers>,
        pool: &WorkerPool<Session>,
        queue: &mut VecDeque<WorkItem>,
        report: &mut ExtractionReport,
    ) -> crate::Result<(VecDeque<WorkItem>, bool)> {
        let mut tasks = JoinSet::new();
        let mut stopped = false;

        while let Some(item) = queue.pop_front() {
            let slot: Option<Slot<Session>> = tokio::select! {
                slot = pool.acquire() => slot,
                _ = self.stop.stopped() => None,
            };

            let Some(slot) = slot.filter(|_| !self.stop.is_stopped()) else {
                stopped = true;
                break;
            };

            let workers = Arc::clone(workers);
            tasks.spawn(async move {
                let outcome = workers.process(&item, slot.resource()).await;
                drop(slot);
                Completed { item, outcome }
            });
        }

        if stopped {
            tracing::info!(
                not_admitted = queue.len() + 1,
                in_flight = tasks.len(),
                "Stop requested; waiting for in-flight extractions"
            );
        }

        let mut next = VecDeque::new();
        let mut storage_error = None;

        while let Some(joined) = tasks.join_next().await {
            let completed = match joined {
                Ok(completed) => completed,
                Err(e) => {
                    tracing::error!(error = %e, "Extraction task panicked");
                    continue;
                }
            };

            let category = report
                .per_category
                .entry(completed.item.category.clone())
                .or_default();

            match completed.outcome {
                Ok(Outcome::Success) => {
                    report.success += 1;
                    category.success += 1;
                }
                Ok(Outcome::Requeue) => {
                    report.retried += 1;
                    next.push_back(completed.item);
                }
                Ok(Outcome::Failed(error)) => {
                    report.failed += 1;
                    category.failed += 1;
                    report.errors.insert(completed.item.url, error);
                }
                Err(e) => {
                    tracing::error!(url = %completed.item.url, error = %e, "Checkpoint update failed");
                    storage_error.get_or_insert(e);
                }
            }
        }

        match storage_error {
            Some(e) => Err(e.into()),
            None => Ok((next, stopped)),
        }
    }
}
