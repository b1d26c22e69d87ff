use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Progress of one category within a crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryProgress {
    /// URLs already in the store when a resumed run started
    pub resumed_from: Option<usize>,

    /// URLs counted toward the quota so far (includes `resumed_from`)
    pub collected: usize,

    /// Fetch units processed so far
    pub batches: u64,
}

/// In-memory record of the current crawl
///
/// Created when the coordinator starts and dropped at process exit; resuming
/// relies on the URL store, not on this structure.
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub started_at: DateTime<Utc>,

    /// Whether this run counts pre-existing store contents toward the quota
    pub resume: bool,

    pub progress: BTreeMap<String, CategoryProgress>,
}

impl CrawlRun {
    /// Creates a new run starting now
    pub fn new(resume: bool) -> Self {
        Self {
            started_at: Utc::now(),
            resume,
            progress: BTreeMap::new(),
        }
    }

    /// Registers a category and the store count found at start
    ///
    /// Returns the coordinator's starting view of the category count.
    pub fn begin_category(&mut self, category: &str, existing: usize) -> usize {
        let baseline = if self.resume { existing } else { 0 };
        self.progress.insert(
            category.to_string(),
            CategoryProgress {
                resumed_from: self.resume.then_some(existing),
                collected: baseline,
                batches: 0,
            },
        );
        baseline
    }

    /// Records one processed fetch unit
    pub fn record_batch(&mut self, category: &str, collected: usize) {
        let entry = self.progress.entry(category.to_string()).or_default();
        entry.collected = collected;
        entry.batches += 1;
    }

    /// Returns the progress for a category
    pub fn category(&self, category: &str) -> Option<&CategoryProgress> {
        self.progress.get(category)
    }
}
