//! Crawl phase: URL store dedup, quota coordination and HTTP listing walks

use crate::common::{article_urls, listing_html, source, ScriptedFetcher, Step, Stores};
use news_harvest::config::{parse_categories, Category, HttpSettings, Pagination, Settings, SourceSettings, UserAgentConfig};
use news_harvest::crawler::{build_http_client, FetchError, HttpSourceFetcher, QuotaCoordinator, SourceFetcher};
use news_harvest::storage::{JsonUrlStore, UrlStore};
use news_harvest::StopSignal;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn category(name: &str, quota: usize, min_per_source: usize, sources: &[&str]) -> Category {
    Category {
        name: name.to_string(),
        quota,
        sources: sources.iter().map(|id| source(id)).collect(),
        min_per_source,
    }
}

fn coordinator(stores: &Stores, fetcher: ScriptedFetcher, resume: bool) -> QuotaCoordinator {
    QuotaCoordinator::new(
        stores.urls.clone(),
        Arc::new(fetcher),
        StopSignal::new(),
        resume,
    )
}

#[test]
fn test_add_is_idempotent_and_durable() {
    let stores = Stores::new();

    assert!(stores.urls.add("sport", "https://a.com/news/1", "a.com").unwrap());
    assert!(!stores.urls.add("sport", "https://a.com/news/1", "b.com").unwrap());
    assert_eq!(stores.urls.count("sport"), 1);
    stores.urls.flush("sport").unwrap();

    let reopened = JsonUrlStore::open(&stores.layout.urls_dir()).unwrap();
    assert_eq!(reopened.count("sport"), 1);
    assert!(!reopened.add("sport", "https://a.com/news/1", "c.com").unwrap());
    assert_eq!(reopened.all_urls("sport")[0].source, "a.com");
}

#[tokio::test]
async fn test_quota_converges_exactly_with_overlapping_sources() {
    let stores = Stores::new();
    let shared = article_urls("shared.example", "wire", 10);

    let mut fetcher = ScriptedFetcher::new();
    for host in ["a.com", "b.com", "c.com"] {
        let mut urls = shared.clone();
        urls.extend(article_urls(host, "news", 35));
        fetcher = fetcher.with_urls(host, urls, 5);
    }

    let summary = coordinator(&stores, fetcher, false)
        .run(&category("world", 100, 10, &["a.com", "b.com", "c.com"]), 3)
        .await
        .unwrap();

    assert_eq!(stores.urls.count("world"), 100);
    assert_eq!(summary.collected, 100);
    assert_eq!(summary.added, 100);
    assert!(summary.quota_reached);
    assert!(!summary.interrupted);
    assert_eq!(summary.per_source.values().sum::<usize>(), 100);

    let reopened = JsonUrlStore::open(&stores.layout.urls_dir()).unwrap();
    assert_eq!(reopened.count("world"), 100);
}

#[tokio::test]
async fn test_first_discovered_unique_urls_win() {
    let stores = Stores::new();
    let unique = article_urls("a.com", "sport", 12);
    let order = [0, 1, 2, 0, 3, 4, 1, 5, 6, 7, 2, 8, 9, 10, 11];
    let candidates: Vec<String> = order.iter().map(|&i| unique[i].clone()).collect();

    let fetcher = ScriptedFetcher::new().with_urls("a.com", candidates, 15);
    let summary = coordinator(&stores, fetcher, false)
        .run(&category("sport", 10, 1, &["a.com"]), 2)
        .await
        .unwrap();

    assert_eq!(summary.collected, 10);
    assert!(summary.quota_reached);

    let kept: Vec<String> = stores
        .urls
        .all_urls("sport")
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(kept, unique[..10].to_vec());
}

#[tokio::test]
async fn test_duplicates_leave_category_below_a_higher_quota() {
    let stores = Stores::new();
    let unique = article_urls("a.com", "sport", 12);
    let order = [0, 1, 2, 0, 3, 4, 1, 5, 6, 7, 2, 8, 9, 10, 11];
    let candidates: Vec<String> = order.iter().map(|&i| unique[i].clone()).collect();

    let fetcher = ScriptedFetcher::new().with_urls("a.com", candidates, 15);
    let summary = coordinator(&stores, fetcher, false)
        .run(&category("sport", 20, 1, &["a.com"]), 2)
        .await
        .unwrap();

    assert_eq!(summary.collected, 12);
    assert_eq!(summary.added, 12);
    assert!(!summary.quota_reached);
    assert!(!summary.interrupted);
    assert_eq!(summary.exhausted_sources, vec!["a.com".to_string()]);
    assert_eq!(stores.urls.count("sport"), 12);

    let kept: Vec<String> = stores
        .urls
        .all_urls("sport")
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(kept, unique);
}

#[tokio::test]
async fn test_resume_counts_existing_urls_toward_quota() {
    let stores = Stores::new();
    for url in article_urls("a.com", "old", 6) {
        stores.urls.add("sport", &url, "a.com").unwrap();
    }

    let fetcher = ScriptedFetcher::new().with_urls("a.com", article_urls("a.com", "new", 20), 5);
    let summary = coordinator(&stores, fetcher, true)
        .run(&category("sport", 10, 1, &["a.com"]), 2)
        .await
        .unwrap();

    assert_eq!(summary.added, 4);
    assert_eq!(summary.collected, 10);
    assert_eq!(stores.urls.count("sport"), 10);
}

#[tokio::test]
async fn test_fresh_run_counts_only_new_urls() {
    let stores = Stores::new();
    for url in article_urls("a.com", "old", 6) {
        stores.urls.add("sport", &url, "a.com").unwrap();
    }

    let fetcher = ScriptedFetcher::new().with_urls("a.com", article_urls("a.com", "new", 20), 5);
    let summary = coordinator(&stores, fetcher, false)
        .run(&category("sport", 10, 1, &["a.com"]), 2)
        .await
        .unwrap();

    assert_eq!(summary.added, 10);
    assert_eq!(stores.urls.count("sport"), 16);
}

#[tokio::test]
async fn test_failed_source_does_not_stop_the_category() {
    let stores = Stores::new();
    let fetcher = ScriptedFetcher::new()
        .with_steps("a.com", vec![Step::Fail(503)])
        .with_urls("b.com", article_urls("b.com", "news", 8), 4);

    let summary = coordinator(&stores, fetcher, false)
        .run(&category("sport", 20, 1, &["a.com", "b.com"]), 2)
        .await
        .unwrap();

    assert_eq!(summary.collected, 8);
    assert!(!summary.quota_reached);
    assert!(summary.source_errors["a.com"].contains("503"));
    assert!(summary.exhausted_sources.contains(&"a.com".to_string()));
    assert!(summary.exhausted_sources.contains(&"b.com".to_string()));
}

#[tokio::test]
async fn test_stop_before_start_collects_nothing() {
    let stores = Stores::new();
    let stop = StopSignal::new();
    stop.stop();

    let fetcher = ScriptedFetcher::new().with_urls("a.com", article_urls("a.com", "news", 20), 5);
    let coordinator = QuotaCoordinator::new(stores.urls.clone(), Arc::new(fetcher), stop, false);
    let summary = coordinator
        .run(&category("sport", 10, 1, &["a.com"]), 2)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.collected, 0);
    assert_eq!(stores.urls.count("sport"), 0);
}

fn http_fetcher() -> HttpSourceFetcher {
    let client = build_http_client(&UserAgentConfig::default(), &HttpSettings::default()).unwrap();
    HttpSourceFetcher::new(client, 3)
}

fn local_settings(pagination: Pagination, max_pages: u32) -> Settings {
    Settings {
        source: vec![SourceSettings {
            domain: "127.0.0.1".to_string(),
            pagination,
            max_pages,
            article_patterns: Vec::new(),
        }],
        ..Default::default()
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

#[tokio::test]
async fn test_http_fetcher_walks_paginated_listing() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sport/"))
        .respond_with(html(listing_html(&[
            "/news/match-1",
            "/news/match-2",
            "/tag/football",
            "/sport/",
            "https://other.example/news/elsewhere",
            "/images/photo.jpg",
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sport/page/2/"))
        .respond_with(html(listing_html(&["/news/match-3", "/news/match-1#comments"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sport/page/3/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let settings = local_settings(Pagination::Path, 5);
    let categories = parse_categories(
        format!(r#"{{"sport": ["{}/sport/"]}}"#, base).as_bytes(),
        &settings,
    )
    .unwrap();
    let source = &categories.categories[0].sources[0];
    assert_eq!(source.id, "127.0.0.1");
    assert_eq!(source.pagination, Pagination::Path);

    let mut batches = http_fetcher().open(source, "sport");

    assert_eq!(
        batches.next_batch().await.unwrap(),
        Some(vec![
            format!("{}/news/match-1", base),
            format!("{}/news/match-2", base),
        ])
    );
    assert_eq!(
        batches.next_batch().await.unwrap(),
        Some(vec![format!("{}/news/match-3", base)])
    );
    assert_eq!(batches.next_batch().await.unwrap(), Some(Vec::new()));
    assert_eq!(batches.next_batch().await.unwrap(), None);
}

#[tokio::test]
async fn test_http_fetcher_follows_next_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sport/"))
        .respond_with(html(
            r#"<a href="/news/match-1">1</a><a href="/news/match-2">2</a>
               <a class="next" href="/sport/page/2/">Next &raquo;</a>"#
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    // Page 2 links back to page 1, which has been visited already
    Mock::given(method("GET"))
        .and(path("/sport/page/2/"))
        .respond_with(html(
            r#"<a href="/news/match-3">3</a><a rel="next" href="/sport/">Next</a>"#.to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = local_settings(Pagination::NextLink, 10);
    let categories = parse_categories(
        format!(r#"{{"sport": ["{}/sport/"]}}"#, base).as_bytes(),
        &settings,
    )
    .unwrap();

    let mut batches = http_fetcher().open(&categories.categories[0].sources[0], "sport");

    assert_eq!(
        batches.next_batch().await.unwrap(),
        Some(vec![
            format!("{}/news/match-1", base),
            format!("{}/news/match-2", base),
        ])
    );
    assert_eq!(
        batches.next_batch().await.unwrap(),
        Some(vec![format!("{}/news/match-3", base)])
    );
    assert_eq!(batches.next_batch().await.unwrap(), None);
}

#[tokio::test]
async fn test_http_fetcher_reports_unavailable_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sport/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let settings = local_settings(Pagination::None, 1);
    let categories = parse_categories(
        format!(r#"{{"sport": ["{}/sport/"]}}"#, server.uri()).as_bytes(),
        &settings,
    )
    .unwrap();

    let mut batches = http_fetcher().open(&categories.categories[0].sources[0], "sport");
    match batches.next_batch().await {
        Err(e @ FetchError::HttpStatus { status: 503, .. }) => assert!(e.is_retryable()),
        other => panic!("expected HTTP 503, got {:?}", other),
    }
}

#[tokio::test]
async fn test_coordinator_over_http_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/world/"))
        .respond_with(html(listing_html(&[
            "/news/a",
            "/news/b",
            "/news/c",
            "/news/d",
        ])))
        .mount(&server)
        .await;

    let stores = Stores::new();
    let mut settings = local_settings(Pagination::None, 1);
    settings.crawler.urls_per_category = 3;
    settings.crawler.min_urls_per_source = 1;
    let categories = parse_categories(
        format!(r#"{{"world": ["{}/world/"]}}"#, server.uri()).as_bytes(),
        &settings,
    )
    .unwrap();

    let coordinator = QuotaCoordinator::new(
        stores.urls.clone(),
        Arc::new(http_fetcher()),
        StopSignal::new(),
        false,
    );
    let summary = coordinator.run(&categories.categories[0], 2).await.unwrap();

    assert_eq!(summary.collected, 3);
    assert!(summary.quota_reached);
    let first = &stores.urls.all_urls("world")[0];
    assert_eq!(first.url, format!("{}/news/a", server.uri()));
    assert_eq!(first.source, "127.0.0.1");
}
