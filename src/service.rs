//! Harvest service: runs one job at a time in the background
//!
//! The service owns a [`RunContext`] and executes [`Job`]s on a spawned tokio
//! task. Its [`ServiceState`] is published on a watch channel so callers can
//! observe a run in progress; [`HarvestService::stop`] asks the running job
//! to drain and [`HarvestService::wait`] collects its [`RunOutcome`].

use crate::context::{RunContext, StopSignal};
use crate::crawler::{CrawlSummary, QuotaCoordinator};
use crate::extract::{ExtractionPipeline, ExtractionReport};
use crate::HarvestError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Work a service run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Create the per-category URL files and article directories
    Sync,

    /// Collect URLs for every category
    Crawl { resume: bool },

    /// Extract articles for every collected URL
    Extract { reset_checkpoint: bool },

    /// Crawl, then extract
    All { resume: bool, reset_checkpoint: bool },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Sync => "sync",
            Job::Crawl { .. } => "crawl",
            Job::Extract { .. } => "extract",
            Job::All { .. } => "all",
        }
    }
}

/// Observable lifecycle of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running(Job),
    /// A stop was requested; in-flight work is draining
    Stopping(Job),
    Finished { job: Job, interrupted: bool },
    Failed { job: Job, error: String },
}

impl ServiceState {
    pub fn is_active(&self) -> bool {
        matches!(self, ServiceState::Running(_) | ServiceState::Stopping(_))
    }
}

/// What a finished job did
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub job: Job,

    /// Categories bootstrapped on disk
    pub synced: Vec<String>,

    pub crawl: Vec<CrawlSummary>,
    pub extraction: Option<ExtractionReport>,

    /// The job stopped early; its progress is checkpointed
    pub interrupted: bool,
}

impl RunOutcome {
    fn new(job: Job) -> Self {
        Self {
            job,
            synced: Vec::new(),
            crawl: Vec::new(),
            extraction: None,
            interrupted: false,
        }
    }
}

struct ActiveJob {
    job: Job,
    stop: StopSignal,
    handle: JoinHandle<crate::Result<RunOutcome>>,
}

/// Runs harvest jobs against one [`RunContext`]
pub struct HarvestService {
    context: RunContext,
    state: Arc<watch::Sender<ServiceState>>,
    active: Mutex<Option<ActiveJob>>,
}

impl HarvestService {
    pub fn new(context: RunContext) -> Self {
        let (state, _rx) = watch::channel(ServiceState::Idle);
        Self {
            context,
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Starts `job` in the background
    ///
    /// Fails with [`HarvestError::AlreadyRunning`] while another job is
    /// still running. A finished job that was never waited on is discarded.
    pub fn start(&self, job: Job) -> crate::Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| !a.handle.is_finished()) {
            return Err(HarvestError::AlreadyRunning);
        }

        let stop = StopSignal::new();
        let mut context = self.context.clone();
        context.stop = stop.clone();

        let state = Arc::clone(&self.state);
        state.send_replace(ServiceState::Running(job));

        let handle = tokio::spawn(async move {
            let result = execute(&context, job).await;
            let next = match &result {
                Ok(outcome) => ServiceState::Finished {
                    job,
                    interrupted: outcome.interrupted,
                },
                Err(e) => ServiceState::Failed {
                    job,
                    error: e.to_string(),
                },
            };
            state.send_replace(next);
            result
        });

        *active = Some(ActiveJob { job, stop, handle });
        Ok(())
    }

    /// Asks the running job to drain and finish early
    ///
    /// Returns false when no job is running.
    pub fn stop(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = active.as_ref().filter(|a| !a.handle.is_finished()) else {
            return false;
        };

        tracing::info!(job = active.job.name(), "Stop requested");
        self.state.send_if_modified(|state| match state {
            ServiceState::Running(job) => {
                *state = ServiceState::Stopping(*job);
                true
            }
            _ => false,
        });
        active.stop.stop();
        true
    }

    /// Current state snapshot
    pub fn status(&self) -> ServiceState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Waits for the last started job and returns its outcome
    pub async fn wait(&self) -> crate::Result<RunOutcome> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(HarvestError::NotStarted)?;

        active
            .handle
            .await
            .map_err(|e| HarvestError::Task(e.to_string()))?
    }

    /// Starts `job` and waits for it
    pub async fn run(&self, job: Job) -> crate::Result<RunOutcome> {
        self.start(job)?;
        self.wait().await
    }
}

#[instrument(skip_all, fields(job = job.name()))]
async fn execute(context: &RunContext, job: Job) -> crate::Result<RunOutcome> {
    let mut outcome = RunOutcome::new(job);

    tracing::info!(
        categories = context.categories.categories.len(),
        categories_hash = %context.categories.hash,
        output = %context.layout.root().display(),
        "Starting job"
    );

    match job {
        Job::Sync => {
            outcome.synced = sync(context)?;
        }
        Job::Crawl { resume } => {
            outcome.synced = sync(context)?;
            crawl(context, resume, &mut outcome).await?;
        }
        Job::Extract { reset_checkpoint } => {
            extract(context, reset_checkpoint, &mut outcome).await?;
        }
        Job::All {
            resume,
            reset_checkpoint,
        } => {
            outcome.synced = sync(context)?;
            crawl(context, resume, &mut outcome).await?;
            if outcome.interrupted {
                tracing::info!("Crawl interrupted; skipping extraction");
            } else {
                extract(context, reset_checkpoint, &mut outcome).await?;
            }
        }
    }

    Ok(outcome)
}

/// Ensures every category has a URL file and an article directory
fn sync(context: &RunContext) -> crate::Result<Vec<String>> {
    let names = context.category_names();
    for name in &names {
        context.urls.ensure_category(name)?;
        context.articles.ensure_category(name)?;
    }
    tracing::info!(categories = names.len(), "Category stores ready");
    Ok(names)
}

async fn crawl(context: &RunContext, resume: bool, outcome: &mut RunOutcome) -> crate::Result<()> {
    let coordinator = QuotaCoordinator::new(
        Arc::clone(&context.urls),
        Arc::clone(&context.fetcher),
        context.stop.clone(),
        resume,
    );
    let max_workers = context.settings.crawler.max_workers;

    for category in &context.categories.categories {
        if context.stop.is_stopped() {
            outcome.interrupted = true;
            break;
        }

        let summary = coordinator.run(category, max_workers).await?;
        let interrupted = summary.interrupted;
        outcome.crawl.push(summary);

        if interrupted {
            outcome.interrupted = true;
            break;
        }
    }

    Ok(())
}

async fn extract(
    context: &RunContext,
    reset_checkpoint: bool,
    outcome: &mut RunOutcome,
) -> crate::Result<()> {
    if reset_checkpoint {
        tracing::info!("Resetting extraction checkpoint");
        context.checkpoint.reset()?;
    }

    let settings = &context.settings;
    let pipeline = ExtractionPipeline::new(
        Arc::clone(&context.urls),
        Arc::clone(&context.checkpoint),
        Arc::clone(&context.articles),
        Arc::clone(&context.registry),
        context.stop.clone(),
        settings.extractor.clone(),
        settings.user_agent.clone(),
        settings.http.clone(),
    );

    let report = pipeline
        .run(
            &context.category_names(),
            settings.extractor.workers,
            settings.extractor.max_retries,
        )
        .await?;

    outcome.interrupted |= report.interrupted;
    outcome.extraction = Some(report);
    Ok(())
}
