use serde::Deserialize;
use url::Url;

/// Runtime settings for news-harvest, loaded from an optional TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawler: CrawlerSettings,
    pub extractor: ExtractorSettings,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub http: HttpSettings,
    pub output: OutputConfig,
    /// Per-source listing behavior, keyed by domain
    pub source: Vec<SourceSettings>,
}

impl Settings {
    /// Looks up the configured listing settings for a source domain
    pub fn source_settings(&self, domain: &str) -> Option<&SourceSettings> {
        let key = crate::url::registry_key(domain);
        self.source
            .iter()
            .find(|s| crate::url::registry_key(&s.domain) == key)
    }

    /// Listing settings for a source domain
    ///
    /// A `[[source]]` entry wins over the built-in listing of a known site.
    /// Unknown sites without an entry only have their seed pages visited.
    pub fn listing_settings(&self, domain: &str) -> SourceSettings {
        if let Some(configured) = self.source_settings(domain) {
            return configured.clone();
        }

        let key = crate::url::registry_key(domain);
        default_source_settings()
            .into_iter()
            .find(|s| s.domain == key)
            .unwrap_or_else(|| SourceSettings::new(&key, Pagination::None, 1))
    }
}

/// Crawl phase configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Target number of unique URLs per category
    #[serde(rename = "urls-per-category")]
    pub urls_per_category: usize,

    /// Size of the crawl worker pool
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// Minimum URLs each source contributes per sweep before others take more
    #[serde(rename = "min-urls-per-source")]
    pub min_urls_per_source: usize,

    /// Consecutive listing pages without a new candidate before a source is exhausted
    #[serde(rename = "max-empty-batches")]
    pub max_empty_batches: u32,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            urls_per_category: 2500,
            max_workers: 3,
            min_urls_per_source: 50,
            max_empty_batches: 3,
        }
    }
}

/// Extraction phase configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Size of the extraction worker pool
    pub workers: usize,

    /// Retries allowed for a transiently failing URL
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Pause before each retry pass (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Completions between per-category progress lines
    #[serde(rename = "progress-interval")]
    pub progress_interval: usize,

    /// In-progress checkpoint writes between flushes
    #[serde(rename = "checkpoint-flush-interval")]
    pub checkpoint_flush_interval: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            workers: 6,
            max_retries: 3,
            retry_delay_ms: 2000,
            progress_interval: 25,
            checkpoint_flush_interval: 20,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "news-harvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/news-harvest".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// HTTP client timeouts shared by listing fetches and article scrapes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for URL stores, checkpoint and articles
    pub directory: String,

    /// Path to the categories JSON file
    #[serde(rename = "categories-file")]
    pub categories_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
            categories_file: "config/categories.json".to_string(),
        }
    }
}

/// How a source paginates its category listing pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pagination {
    /// Only the seed page itself
    #[default]
    None,
    /// `?page=N`
    Query,
    /// `/page/N/`
    Path,
    /// `/N`
    Suffix,
    /// Follow the page's "next" link
    #[serde(rename = "next-link")]
    NextLink,
}

/// Listing settings for one source domain
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub domain: String,

    #[serde(default)]
    pub pagination: Pagination,

    /// Listing pages visited per seed
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Path fragments an article URL must contain (any of them); empty accepts all
    #[serde(rename = "article-patterns", default)]
    pub article_patterns: Vec<String>,
}

impl SourceSettings {
    pub fn new(domain: &str, pagination: Pagination, max_pages: u32) -> Self {
        Self {
            domain: domain.to_string(),
            pagination,
            max_pages,
            article_patterns: Vec::new(),
        }
    }
}

fn default_max_pages() -> u32 {
    10
}

/// Built-in listing settings for the known news sites
pub fn default_source_settings() -> Vec<SourceSettings> {
    vec![
        SourceSettings::new("btv.com.kh", Pagination::Query, 100),
        SourceSettings::new("postkhmer.com", Pagination::Query, 30),
        SourceSettings::new("rfa.org", Pagination::NextLink, 100),
        SourceSettings::new("dap-news.com", Pagination::NextLink, 100),
        SourceSettings::new("news.sabay.com.kh", Pagination::Suffix, 100),
        SourceSettings::new("kohsantepheapdaily.com.kh", Pagination::Path, 20),
    ]
}

/// One news website acting as a provider of candidate URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Normalized domain, used as the source identifier
    pub id: String,

    /// Category landing pages on this site
    pub seeds: Vec<Url>,

    pub pagination: Pagination,

    pub max_pages: u32,

    pub article_patterns: Vec<String>,
}

/// A topical bucket with its own quota and source list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub quota: usize,
    pub sources: Vec<Source>,
    pub min_per_source: usize,
}

/// All categories loaded from the categories file
#[derive(Debug, Clone)]
pub struct CategorySet {
    pub categories: Vec<Category>,

    /// Hex-encoded SHA-256 of the categories file
    pub hash: String,
}

impl CategorySet {
    /// Returns the category with the given name
    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Returns the category names in file order
    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Restricts the set to the named categories
    ///
    /// An empty filter keeps every category. Unknown names are an error so a
    /// typo never silently turns into an empty run.
    pub fn select(&self, names: &[String]) -> crate::ConfigResult<CategorySet> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        let mut categories = Vec::with_capacity(names.len());
        for name in names {
            let category = self
                .get(name)
                .ok_or_else(|| crate::ConfigError::UnknownCategory(name.clone()))?;
            categories.push(category.clone());
        }

        Ok(CategorySet {
            categories,
            hash: self.hash.clone(),
        })
    }
}
