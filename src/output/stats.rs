//! Statistics over the on-disk stores
//!
//! Reads the URL stores, the checkpoint and the article directories and
//! reports per-category progress without running any phase.

use crate::storage::{ArticleStore, CheckpointStore, StatusCounts, StorageResult, UrlStore};

/// Progress of one category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStatistics {
    pub name: String,

    /// URLs in the category's URL store
    pub urls: usize,

    /// Checkpoint status of those URLs; URLs without an entry count as pending
    pub checkpoint: StatusCounts,

    /// Article files on disk
    pub articles: usize,
}

/// Statistics for every category of a harvest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStatistics {
    pub categories: Vec<CategoryStatistics>,

    /// Summed over all categories
    pub totals: StatusCounts,
    pub total_urls: usize,
    pub total_articles: usize,

    /// The checkpoint file was unreadable when opened
    pub checkpoint_recovered: bool,
}

/// Loads statistics for `categories` from the stores
///
/// # Arguments
///
/// * `urls` - The URL store
/// * `checkpoint` - The extraction checkpoint
/// * `articles` - The article store
/// * `categories` - Category names, reported in this order
pub fn load_statistics(
    urls: &dyn UrlStore,
    checkpoint: &dyn CheckpointStore,
    articles: &dyn ArticleStore,
    categories: &[String],
) -> StorageResult<HarvestStatistics> {
    let mut stats = HarvestStatistics {
        checkpoint_recovered: checkpoint.recovered(),
        ..Default::default()
    };

    for name in categories {
        let category_urls: Vec<String> = urls.all_urls(name).into_iter().map(|r| r.url).collect();
        let counts = checkpoint.counts(Some(category_urls.as_slice()));
        let article_count = articles.count(name)?;

        stats.totals.pending += counts.pending;
        stats.totals.in_progress += counts.in_progress;
        stats.totals.success += counts.success;
        stats.totals.failed += counts.failed;
        stats.total_urls += category_urls.len();
        stats.total_articles += article_count;

        stats.categories.push(CategoryStatistics {
            name: name.clone(),
            urls: category_urls.len(),
            checkpoint: counts,
            articles: article_count,
        });
    }

    Ok(stats)
}

/// Formats statistics as a plain-text table
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::new();

    out.push_str("=== Harvest Statistics ===\n\n");
    out.push_str(&format!(
        "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>9} {:>8}\n",
        "category", "urls", "pending", "running", "success", "failed", "articles", "rate"
    ));

    for category in &stats.categories {
        let counts = &category.checkpoint;
        out.push_str(&format!(
            "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>9} {:>7.1}%\n",
            category.name,
            category.urls,
            counts.pending,
            counts.in_progress,
            counts.success,
            counts.failed,
            category.articles,
            counts.success_rate()
        ));
    }

    out.push('\n');
    out.push_str(&format!("Total URLs: {}\n", stats.total_urls));
    out.push_str(&format!("Total articles: {}\n", stats.total_articles));
    out.push_str(&format!(
        "Success Rate: {:.1}% ({} succeeded, {} failed, {} not finished)\n",
        stats.totals.success_rate(),
        stats.totals.success,
        stats.totals.failed,
        stats.totals.pending + stats.totals.in_progress
    ));

    if stats.checkpoint_recovered {
        out.push_str("\nWarning: the checkpoint file was unreadable and has been set aside; every URL counts as pending.\n");
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}
