//! Crawler module: the URL collection phase
//!
//! This module contains the crawl side of the harvester, including:
//! - HTTP fetching and error classification
//! - Listing page parsing and article link filtering
//! - Source fetchers producing candidate URL batches
//! - Quota coordination across the sources of a category

mod coordinator;
mod fetcher;
mod parser;
mod source;

pub use coordinator::{CrawlSummary, QuotaCoordinator};
pub use fetcher::{build_http_client, fetch_html, FetchError, Session};
pub use parser::{extract_article_links, find_next_page, is_article_like, LinkFilter};
pub use source::{page_url, HttpSourceFetcher, SourceFetcher, UrlBatches};
