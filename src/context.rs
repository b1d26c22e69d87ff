//! Run context shared by every phase of a harvest
//!
//! A [`RunContext`] bundles the immutable configuration of a run with the
//! stores and network components the phases work through, plus the
//! [`StopSignal`] used for cooperative shutdown.

use crate::config::{CategorySet, Settings};
use crate::crawler::{build_http_client, HttpSourceFetcher, SourceFetcher};
use crate::extract::CapabilityRegistry;
use crate::storage::{
    ArticleStore, CheckpointStore, JsonArticleStore, JsonCheckpointStore, JsonUrlStore,
    StoreLayout, UrlStore,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative stop flag
///
/// Cloning shares the flag. Once stopped it stays stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests a stop
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let stopped = *rx.borrow_and_update();
            if stopped {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a harvest run needs
#[derive(Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub categories: CategorySet,
    pub layout: StoreLayout,
    pub urls: Arc<dyn UrlStore>,
    pub checkpoint: Arc<dyn CheckpointStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub registry: Arc<CapabilityRegistry>,
    pub stop: StopSignal,
}

impl RunContext {
    /// Opens the JSON stores under `layout` and wires up the HTTP listing
    /// fetcher and the built-in site scrapers
    pub fn open(
        settings: Settings,
        categories: CategorySet,
        layout: StoreLayout,
    ) -> crate::Result<Self> {
        let client = build_http_client(&settings.user_agent, &settings.http)?;
        let fetcher = Arc::new(HttpSourceFetcher::new(
            client,
            settings.crawler.max_empty_batches,
        ));
        let registry = Arc::new(CapabilityRegistry::with_default_sites());

        Self::with_components(settings, categories, layout, fetcher, registry)
    }

    /// Opens the JSON stores under `layout` with the given listing fetcher
    /// and scraper registry
    pub fn with_components(
        settings: Settings,
        categories: CategorySet,
        layout: StoreLayout,
        fetcher: Arc<dyn SourceFetcher>,
        registry: Arc<CapabilityRegistry>,
    ) -> crate::Result<Self> {
        let urls = JsonUrlStore::open(&layout.urls_dir())?;
        let checkpoint = JsonCheckpointStore::open(
            &layout.checkpoint_path(),
            settings.extractor.checkpoint_flush_interval,
        )?;
        let articles = JsonArticleStore::new(&layout.articles_dir());

        tracing::debug!(
            root = %layout.root().display(),
            categories = categories.categories.len(),
            scrapers = registry.domains().len(),
            "Opened run context"
        );

        Ok(Self {
            settings,
            categories,
            layout,
            urls: Arc::new(urls),
            checkpoint: Arc::new(checkpoint),
            articles: Arc::new(articles),
            fetcher,
            registry,
            stop: StopSignal::new(),
        })
    }

    /// Names of the categories in this run
    pub fn category_names(&self) -> Vec<String> {
        self.categories.names()
    }
}
