//! Shared fixtures: in-memory sources, a scripted scraper and store helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use news_harvest::config::{Pagination, Source};
use news_harvest::crawler::{FetchError, Session, SourceFetcher, UrlBatches};
use news_harvest::extract::{ScrapeError, ScraperCapability};
use news_harvest::storage::{ArticleRecord, JsonArticleStore, JsonCheckpointStore, JsonUrlStore, StoreLayout};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Builds a source with no listing settings
pub fn source(id: &str) -> Source {
    Source {
        id: id.to_string(),
        seeds: vec![Url::parse(&format!("https://{}/", id)).unwrap()],
        pagination: Pagination::None,
        max_pages: 1,
        article_patterns: Vec::new(),
    }
}

/// One scripted step of an in-memory source
#[derive(Debug, Clone)]
pub enum Step {
    Batch(Vec<String>),
    Fail(u16),
}

/// Source fetcher serving fixed batches per source id
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Vec<Step>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `urls` from `source` in batches of `batch_size`
    pub fn with_urls(mut self, source: &str, urls: Vec<String>, batch_size: usize) -> Self {
        let steps = urls
            .chunks(batch_size)
            .map(|chunk| Step::Batch(chunk.to_vec()))
            .collect();
        self.scripts.insert(source.to_string(), steps);
        self
    }

    pub fn with_steps(mut self, source: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(source.to_string(), steps);
        self
    }
}

struct Scripted {
    source: String,
    steps: VecDeque<Step>,
}

#[async_trait]
impl UrlBatches for Scripted {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>, FetchError> {
        tokio::task::yield_now().await;
        match self.steps.pop_front() {
            Some(Step::Batch(urls)) => Ok(Some(urls)),
            Some(Step::Fail(status)) => Err(FetchError::HttpStatus {
                url: format!("https://{}/", self.source),
                status,
            }),
            None => Ok(None),
        }
    }
}

impl SourceFetcher for ScriptedFetcher {
    fn open(&self, source: &Source, _category: &str) -> Box<dyn UrlBatches> {
        Box::new(Scripted {
            source: source.id.clone(),
            steps: self
                .scripts
                .get(&source.id)
                .cloned()
                .unwrap_or_default()
                .into(),
        })
    }
}

/// What the scripted scraper does for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    FailPermanently,
    FailTransiently,
}

/// Scraper that never touches the network and records every attempt
pub struct ScriptedScraper {
    default: Behavior,
    overrides: HashMap<String, Behavior>,
    delay: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedScraper {
    pub fn new() -> Self {
        Self {
            default: Behavior::Succeed,
            overrides: HashMap::new(),
            delay: Duration::ZERO,
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(mut self, url: &str, behavior: Behavior) -> Self {
        self.overrides.insert(url.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self, url: &str) -> u32 {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScraperCapability for ScriptedScraper {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn scrape(
        &self,
        _session: &Session,
        url: &Url,
        category: &str,
    ) -> Result<ArticleRecord, ScrapeError> {
        let key = url.to_string();
        *self.attempts.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.overrides.get(&key).copied().unwrap_or(self.default) {
            Behavior::Succeed => Ok(ArticleRecord {
                url: key,
                category: category.to_string(),
                title: "Title".to_string(),
                body: "Body".to_string(),
                extracted_at: Utc::now(),
                source: url.host_str().unwrap_or_default().to_string(),
                extractor: "scripted".to_string(),
            }),
            Behavior::FailPermanently => Err(ScrapeError::SelectorNotFound {
                url: key,
                what: "title",
            }),
            Behavior::FailTransiently => Err(ScrapeError::Timeout(key)),
        }
    }
}

/// JSON stores rooted in a temporary directory
pub struct Stores {
    pub dir: TempDir,
    pub layout: StoreLayout,
    pub urls: Arc<JsonUrlStore>,
    pub checkpoint: Arc<JsonCheckpointStore>,
    pub articles: Arc<JsonArticleStore>,
}

impl Stores {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let urls = Arc::new(JsonUrlStore::open(&layout.urls_dir()).unwrap());
        let checkpoint = Arc::new(JsonCheckpointStore::open(&layout.checkpoint_path(), 5).unwrap());
        let articles = Arc::new(JsonArticleStore::new(&layout.articles_dir()));
        Self {
            dir,
            layout,
            urls,
            checkpoint,
            articles,
        }
    }

    /// Reopens the checkpoint from disk, as a new process would
    pub fn reopen_checkpoint(&mut self) {
        self.checkpoint =
            Arc::new(JsonCheckpointStore::open(&self.layout.checkpoint_path(), 5).unwrap());
    }
}

/// `count` distinct article URLs on `host`
pub fn article_urls(host: &str, prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://{}/{}/{}", host, prefix, i))
        .collect()
}

/// Minimal article page the generic heuristics can read
pub fn article_html(title: &str) -> String {
    format!(
        "<html><head><title>{title} | News</title></head><body>\
         <nav><a href=\"/\">Home</a></nav>\
         <article><h1>{title}</h1><p>First paragraph of {title}.</p><p>Second paragraph.</p></article>\
         </body></html>"
    )
}

/// Listing page linking to `paths`
pub fn listing_html(paths: &[&str]) -> String {
    let links: String = paths
        .iter()
        .map(|p| format!("<li><a href=\"{}\">{}</a></li>", p, p))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", links)
}
