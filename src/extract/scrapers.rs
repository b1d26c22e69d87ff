//! Content scrapers
//!
//! A [`ScraperCapability`] turns an article URL into an [`ArticleRecord`].
//! Site scrapers are [`SelectorScraper`]s driven by a [`SiteProfile`]; any
//! selector that finds nothing falls back to the generic heuristics, which
//! are also what [`GenericScraper`] uses on its own.

use crate::crawler::{FetchError, Session};
use crate::storage::ArticleRecord;
use crate::url::{extract_domain, registry_key};
use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Title selectors tried in order; the second element names an attribute to read
const GENERIC_TITLE_SELECTORS: &[(&str, Option<&str>)] = &[
    ("h1", None),
    ("h1.title", None),
    ("h1.article-title", None),
    ("h1.entry-title", None),
    ("h1.post-title", None),
    ("article h1", None),
    (".article-title", None),
    (".entry-title", None),
    (".post-title", None),
    (".headline", None),
    ("meta[property='og:title']", Some("content")),
    ("title", None),
];

/// Content container selectors tried in order
const GENERIC_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "div.article-content",
    "div.entry-content",
    "div.post-content",
    "div.content",
    ".article-body",
    "#article-body",
    ".entry-content",
    ".post-content",
    ".story-body",
    "main",
];

/// Errors from scraping one URL
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("No {what} found on {url}")]
    SelectorNotFound { url: String, what: &'static str },

    #[error("Malformed content at {url}: {reason}")]
    MalformedContent { url: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to store article: {0}")]
    Store(String),
}

impl ScrapeError {
    /// Returns true if the URL should be tried again in a later pass
    ///
    /// Timeouts, connection errors, HTTP 429/5xx and article store write
    /// failures are transient; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Store(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::SelectorNotFound { .. }
            | Self::MalformedContent { .. }
            | Self::InvalidUrl(_)
            | Self::Request(_) => false,
        }
    }
}

impl From<FetchError> for ScrapeError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout { url } => Self::Timeout(url),
            FetchError::Connect { .. } | FetchError::Network { .. } => {
                Self::Network(e.to_string())
            }
            FetchError::HttpStatus { url, status } => Self::HttpStatus { url, status },
            FetchError::NotHtml { url, content_type } => Self::MalformedContent {
                url,
                reason: format!("content type {}", content_type),
            },
            FetchError::Request { .. } => Self::Request(e.to_string()),
        }
    }
}

/// Extracts an article from a URL
#[async_trait]
pub trait ScraperCapability: Send + Sync {
    /// Name recorded as the article's `extractor`
    fn name(&self) -> &str;

    async fn scrape(
        &self,
        session: &Session,
        url: &Url,
        category: &str,
    ) -> Result<ArticleRecord, ScrapeError>;
}

/// Selectors for one news site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: String,

    /// Registry key of the site (lowercase, no `www.`)
    pub domain: String,

    /// CSS selector of the headline element
    pub title_selector: String,

    /// CSS selector of the article body container
    pub content_selector: String,
}

impl SiteProfile {
    pub fn new(name: &str, domain: &str, title_selector: &str, content_selector: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: registry_key(domain),
            title_selector: title_selector.to_string(),
            content_selector: content_selector.to_string(),
        }
    }
}

/// Built-in site profiles
pub fn default_site_profiles() -> Vec<SiteProfile> {
    vec![
        SiteProfile::new("btv", "btv.com.kh", "h4.color", ".font-size-detail.textview"),
        SiteProfile::new(
            "postkhmer",
            "postkhmer.com",
            "div.section-article-header h2",
            ".article-text",
        ),
        SiteProfile::new("rfa", "rfa.org", "h1.page_title", "div.articleText, div.wysiwyg"),
        SiteProfile::new("dapnews", "dap-news.com", "title", "#content-main"),
        SiteProfile::new(
            "sabay",
            "news.sabay.com.kh",
            "div.title.detail p",
            "div.detail.content-detail",
        ),
        SiteProfile::new(
            "kohsantepheap",
            "kohsantepheapdaily.com.kh",
            "div.article-recap h1",
            ".content-text",
        ),
    ]
}

/// Parsed generic selectors
struct Heuristics {
    titles: Vec<(Selector, Option<&'static str>)>,
    contents: Vec<Selector>,
    paragraph: Option<Selector>,
}

impl Heuristics {
    fn new() -> Self {
        Self {
            titles: GENERIC_TITLE_SELECTORS
                .iter()
                .filter_map(|(css, attr)| Selector::parse(css).ok().map(|s| (s, *attr)))
                .collect(),
            contents: GENERIC_CONTENT_SELECTORS
                .iter()
                .filter_map(|css| Selector::parse(css).ok())
                .collect(),
            paragraph: Selector::parse("p").ok(),
        }
    }

    fn title(&self, document: &Html) -> Option<String> {
        self.titles.iter().find_map(|(selector, attr)| {
            let element = document.select(selector).next()?;
            let text = match attr {
                Some(attr) => element.value().attr(attr)?.to_string(),
                None => element_text(element),
            };
            non_empty(text)
        })
    }

    fn content(&self, document: &Html) -> Option<String> {
        self.contents
            .iter()
            .find_map(|selector| {
                let element = document.select(selector).next()?;
                self.paragraphs(element)
            })
            .or_else(|| self.paragraphs(document.root_element()))
    }

    /// Joins the non-empty `<p>` texts under `element` with blank lines
    fn paragraphs(&self, element: ElementRef<'_>) -> Option<String> {
        let paragraph = self.paragraph.as_ref()?;
        let text = element
            .select(paragraph)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        non_empty(text)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Title and body pulled out of an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub title: String,
    pub body: String,
}

/// Scraper driven by a site profile, falling back to the generic heuristics
pub struct SelectorScraper {
    name: String,
    title: Option<Selector>,
    content: Option<Selector>,
    heuristics: Heuristics,
}

impl SelectorScraper {
    /// Builds a scraper from a profile
    ///
    /// A selector that fails to parse is logged and skipped in favor of the
    /// generic heuristics.
    pub fn new(profile: &SiteProfile) -> Self {
        let parse = |css: &str, what: &str| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!(site = %profile.name, what, selector = css, error = ?e, "Unusable selector");
                None
            }
        };

        Self {
            name: profile.name.clone(),
            title: parse(&profile.title_selector, "title"),
            content: parse(&profile.content_selector, "content"),
            heuristics: Heuristics::new(),
        }
    }

    /// Pulls the title and body out of an article page
    pub fn extract(&self, html: &str, url: &Url) -> Result<ExtractedText, ScrapeError> {
        if html.trim().is_empty() {
            return Err(ScrapeError::MalformedContent {
                url: url.to_string(),
                reason: "empty document".to_string(),
            });
        }

        let document = Html::parse_document(html);

        let title = self
            .title
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|e| non_empty(element_text(e)))
            .or_else(|| self.heuristics.title(&document))
            .ok_or_else(|| ScrapeError::SelectorNotFound {
                url: url.to_string(),
                what: "title",
            })?;

        let body = self
            .content
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|e| self.heuristics.paragraphs(e))
            .or_else(|| self.heuristics.content(&document))
            .ok_or_else(|| ScrapeError::SelectorNotFound {
                url: url.to_string(),
                what: "article body",
            })?;

        Ok(ExtractedText { title, body })
    }
}

#[async_trait]
impl ScraperCapability for SelectorScraper {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "debug", skip_all, fields(scraper = %self.name, %url))]
    async fn scrape(
        &self,
        session: &Session,
        url: &Url,
        category: &str,
    ) -> Result<ArticleRecord, ScrapeError> {
        let source = extract_domain(url).ok_or_else(|| ScrapeError::InvalidUrl(url.to_string()))?;

        let html = session.fetch_html(url).await?;
        let text = self.extract(&html, url)?;

        tracing::debug!(
            session = session.id(),
            title_chars = text.title.chars().count(),
            body_chars = text.body.chars().count(),
            "Extracted article"
        );

        Ok(ArticleRecord {
            url: url.to_string(),
            category: category.to_string(),
            title: text.title,
            body: text.body,
            extracted_at: Utc::now(),
            source,
            extractor: self.name.clone(),
        })
    }
}

/// Name of the fallback scraper
pub const GENERIC_SCRAPER_NAME: &str = "generic";

/// Fallback scraper using only the generic heuristics
pub struct GenericScraper {
    inner: SelectorScraper,
}

impl GenericScraper {
    pub fn new() -> Self {
        Self {
            inner: SelectorScraper {
                name: GENERIC_SCRAPER_NAME.to_string(),
                title: None,
                content: None,
                heuristics: Heuristics::new(),
            },
        }
    }

    pub fn extract(&self, html: &str, url: &Url) -> Result<ExtractedText, ScrapeError> {
        self.inner.extract(html, url)
    }
}

impl Default for GenericScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScraperCapability for GenericScraper {
    fn name(&self) -> &str {
        GENERIC_SCRAPER_NAME
    }

    async fn scrape(
        &self,
        session: &Session,
        url: &Url,
        category: &str,
    ) -> Result<ArticleRecord, ScrapeError> {
        self.inner.scrape(session, url, category).await
    }
}
