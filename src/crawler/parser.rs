//! Listing page parser
//!
//! This module extracts candidate article links from a category listing
//! page:
//! - Collects `<a href>` links and resolves them against the page URL
//! - Normalizes them (the URL store dedups on the normalized form)
//! - Keeps only same-site links that look like articles
//! - Finds the "next page" link for sites paginated by link

use crate::url::{normalize_url, same_site};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Path segments that mark navigation pages rather than articles
const NON_ARTICLE_SEGMENTS: &[&str] = &[
    "tag",
    "tags",
    "category",
    "categories",
    "author",
    "page",
    "search",
    "login",
    "register",
    "feed",
    "wp-admin",
    "wp-content",
    "wp-json",
];

/// File extensions that are never articles
const NON_ARTICLE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "pdf", "mp3", "mp4", "zip", "css", "js", "xml",
];

/// Filters applied to links found on a listing page
#[derive(Debug, Clone)]
pub struct LinkFilter<'a> {
    /// Registry key of the source; links elsewhere are dropped
    pub site: &'a str,

    /// Fragments an article URL must contain (any); empty accepts all
    pub patterns: &'a [String],

    /// Listing entry points, never returned as candidates
    pub seeds: &'a [Url],
}

/// Extracts article candidates from a listing page
///
/// Returns normalized URLs in document order, without duplicates.
///
/// # Example
///
/// ```
/// use news_harvest::crawler::{extract_article_links, LinkFilter};
/// use url::Url;
///
/// let page = Url::parse("https://news.example.com/sport/").unwrap();
/// let html = r#"<a href="/sport/2024/match-report">Report</a><a href="/tag/football">Tag</a>"#;
/// let filter = LinkFilter { site: "news.example.com", patterns: &[], seeds: &[page.clone()] };
///
/// let links = extract_article_links(html, &page, &filter);
/// assert_eq!(links, vec!["https://news.example.com/sport/2024/match-report".to_string()]);
/// ```
pub fn extract_article_links(html: &str, page_url: &Url, filter: &LinkFilter<'_>) -> Vec<String> {
    let document = Html::parse_document(html);

    let seeds: HashSet<String> = filter
        .seeds
        .iter()
        .filter_map(|s| normalize_url(s.as_str()).ok())
        .map(|u| u.to_string())
        .collect();

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in extract_hrefs(&document) {
        let Some(absolute) = resolve_link(href, page_url) else {
            continue;
        };
        let Ok(normalized) = normalize_url(&absolute) else {
            continue;
        };

        if !same_site(&normalized, filter.site) || !is_article_like(&normalized, filter.patterns) {
            continue;
        }

        let candidate = normalized.to_string();
        if seeds.contains(&candidate) {
            continue;
        }
        if seen.insert(candidate.clone()) {
            links.push(candidate);
        }
    }

    links
}

/// Texts of pagination anchors pointing forward
const NEXT_LINK_TEXTS: &[&str] = &[">", ">>", "\u{203a}", "\u{bb}"];

/// Finds the link to the next listing page
///
/// An anchor qualifies when it has `rel="next"`, a `next` class, or a label
/// starting with "next" or made of a forward arrow. The target must stay on
/// `site` and differ from the current page.
pub fn find_next_page(html: &str, page_url: &Url, site: &str) -> Option<Url> {
    let document = Html::parse_document(html);
    let a_selector = Selector::parse("a[href]").ok()?;

    document
        .select(&a_selector)
        .filter(|a| is_next_anchor(*a))
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(href, page_url))
        .filter_map(|link| Url::parse(&link).ok())
        .find(|url| same_site(url, site) && url != page_url)
}

fn is_next_anchor(anchor: ElementRef<'_>) -> bool {
    let element = anchor.value();

    let rel_next = element
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("next")));
    if rel_next || element.classes().any(|c| c.eq_ignore_ascii_case("next")) {
        return true;
    }

    let label = anchor.text().collect::<String>().trim().to_lowercase();
    label.starts_with("next") || NEXT_LINK_TEXTS.contains(&label.as_str())
}

/// Returns every `<a href>` value, skipping download links
fn extract_hrefs(document: &Html) -> Vec<&str> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"))
        .collect()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}

/// Returns true if a same-site URL looks like an article page
pub fn is_article_like(url: &Url, patterns: &[String]) -> bool {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if segments.is_empty() {
        return false;
    }

    if segments
        .iter()
        .any(|seg| NON_ARTICLE_SEGMENTS.contains(&seg.to_ascii_lowercase().as_str()))
    {
        return false;
    }

    if let Some(last) = segments.last() {
        if let Some((_, ext)) = last.rsplit_once('.') {
            if NON_ARTICLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                return false;
            }
        }
    }

    patterns.is_empty() || patterns.iter().any(|p| url.as_str().contains(p.as_str()))
}
