//! Source fetchers: where candidate URLs come from
//!
//! A [`SourceFetcher`] opens a lazy stream of URL batches for one source and
//! category. The coordinator pulls one batch at a time and never cancels a
//! batch midway.

use crate::config::{Pagination, Source};
use crate::crawler::fetcher::{fetch_html, FetchError};
use crate::crawler::parser::{extract_article_links, find_next_page, LinkFilter};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use url::Url;

/// Lazy sequence of candidate URL batches from one source
#[async_trait]
pub trait UrlBatches: Send {
    /// Fetches the next unit of work
    ///
    /// Returns `Ok(None)` once the source has nothing more to offer. After an
    /// error the stream is kept and asked again in a later sweep.
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>, FetchError>;
}

/// Produces candidate URL streams for a source and category
pub trait SourceFetcher: Send + Sync {
    fn open(&self, source: &Source, category: &str) -> Box<dyn UrlBatches>;
}

/// Fetcher that walks a source's paginated listing pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: Client,
    max_empty_batches: u32,
}

impl HttpSourceFetcher {
    pub fn new(client: Client, max_empty_batches: u32) -> Self {
        Self {
            client,
            max_empty_batches: max_empty_batches.max(1),
        }
    }
}

impl SourceFetcher for HttpSourceFetcher {
    fn open(&self, source: &Source, category: &str) -> Box<dyn UrlBatches> {
        tracing::debug!(
            source = %source.id,
            category,
            seeds = source.seeds.len(),
            max_pages = source.max_pages,
            "Opening listing walker"
        );

        Box::new(ListingWalker {
            client: self.client.clone(),
            source: source.clone(),
            max_empty_batches: self.max_empty_batches,
            seed_index: 0,
            page: 0,
            empty_streak: 0,
            next: None,
            seen: HashSet::new(),
            visited: HashSet::new(),
        })
    }
}

/// Walks listing pages seed by seed, one page per batch
struct ListingWalker {
    client: Client,
    source: Source,
    max_empty_batches: u32,
    seed_index: usize,
    /// Last page number fetched for the current seed (1-based)
    page: u32,
    /// Consecutive pages of the current seed without a new candidate
    empty_streak: u32,
    /// Next page found on the last listing page, for link-following sources
    next: Option<Url>,
    seen: HashSet<String>,
    /// Listing pages already queued, so link cycles end the seed
    visited: HashSet<String>,
}

impl ListingWalker {
    /// Advances to the next listing page, moving to the next seed as needed
    fn next_page(&mut self) -> Option<Url> {
        loop {
            let seed = self.source.seeds.get(self.seed_index)?;

            let seed_done = self.page >= self.source.max_pages
                || self.empty_streak >= self.max_empty_batches
                || (self.page >= 1
                    && match self.source.pagination {
                        Pagination::None => true,
                        Pagination::NextLink => self.next.is_none(),
                        _ => false,
                    });

            if seed_done {
                self.seed_index += 1;
                self.page = 0;
                self.empty_streak = 0;
                self.next = None;
                continue;
            }

            self.page += 1;
            let url = match self.next.take() {
                Some(next) => next,
                None => page_url(seed, self.source.pagination, self.page),
            };
            self.visited.insert(url.to_string());
            return Some(url);
        }
    }

    /// Stops paginating the current seed
    fn end_seed(&mut self) {
        self.page = self.source.max_pages;
        self.next = None;
    }
}

#[async_trait]
impl UrlBatches for ListingWalker {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>, FetchError> {
        let Some(url) = self.next_page() else {
            tracing::debug!(source = %self.source.id, "Listing pages exhausted");
            return Ok(None);
        };

        let html = match fetch_html(&self.client, &url).await {
            Ok(html) => html,
            // Past the first page a 404 is the end of the pagination
            Err(FetchError::HttpStatus { status, .. })
                if self.page > 1 && status == StatusCode::NOT_FOUND.as_u16() =>
            {
                tracing::debug!(source = %self.source.id, page = %url, "Pagination ended");
                self.end_seed();
                return Ok(Some(Vec::new()));
            }
            Err(e) => return Err(e),
        };

        if self.source.pagination == Pagination::NextLink {
            self.next = find_next_page(&html, &url, &self.source.id)
                .filter(|next| !self.visited.contains(next.as_str()));
        }

        let filter = LinkFilter {
            site: &self.source.id,
            patterns: &self.source.article_patterns,
            seeds: &self.source.seeds,
        };

        let fresh: Vec<String> = extract_article_links(&html, &url, &filter)
            .into_iter()
            .filter(|link| self.seen.insert(link.clone()))
            .collect();

        if fresh.is_empty() {
            self.empty_streak += 1;
        } else {
            self.empty_streak = 0;
        }

        tracing::trace!(
            source = %self.source.id,
            page = %url,
            candidates = fresh.len(),
            "Fetched listing page"
        );

        Ok(Some(fresh))
    }
}

/// Builds the URL of listing page `page` (1-based) for a seed
///
/// Page 1 is always the seed itself. Styles without a computed page URL
/// (`none`, `next-link`) always yield the seed.
pub fn page_url(seed: &Url, pagination: Pagination, page: u32) -> Url {
    if page <= 1 {
        return seed.clone();
    }

    let mut url = seed.clone();
    match pagination {
        Pagination::None | Pagination::NextLink => {}
        Pagination::Query => {
            let pairs: Vec<(String, String)> = seed
                .query_pairs()
                .filter(|(k, _)| k != "page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();

            let mut query = url.query_pairs_mut();
            query.clear();
            for (k, v) in &pairs {
                query.append_pair(k, v);
            }
            query.append_pair("page", &page.to_string());
        }
        Pagination::Path => {
            let base = seed.path().trim_end_matches('/');
            url.set_path(&format!("{}/page/{}/", base, page));
        }
        Pagination::Suffix => {
            let base = seed.path().trim_end_matches('/');
            url.set_path(&format!("{}/{}", base, page));
        }
    }
    url
}
