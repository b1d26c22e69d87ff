//! Extraction phase: checkpoint resume, reset, retries, concurrency and drain

use crate::common::{article_urls, Behavior, ScriptedScraper, Stores};
use news_harvest::config::{ExtractorSettings, HttpSettings, UserAgentConfig};
use news_harvest::extract::{CapabilityRegistry, ExtractionPipeline, SiteProfile};
use news_harvest::storage::{ArticleRecord, ArticleStore, CheckpointStore, UrlStore};
use news_harvest::{CheckpointStatus, StopSignal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sport() -> Vec<String> {
    vec!["sport".to_string()]
}

fn seed_urls(stores: &Stores, urls: &[String]) {
    for url in urls {
        stores.urls.add("sport", url, "a.com").unwrap();
    }
    stores.urls.flush("sport").unwrap();
}

fn scripted(scraper: &Arc<ScriptedScraper>) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.set_fallback(scraper.clone());
    registry
}

fn pipeline(stores: &Stores, registry: CapabilityRegistry, stop: StopSignal) -> ExtractionPipeline {
    let settings = ExtractorSettings {
        retry_delay_ms: 0,
        progress_interval: 10,
        ..Default::default()
    };
    ExtractionPipeline::new(
        stores.urls.clone(),
        stores.checkpoint.clone(),
        stores.articles.clone(),
        Arc::new(registry),
        stop,
        settings,
        UserAgentConfig::default(),
        HttpSettings::default(),
    )
}

#[tokio::test]
async fn test_second_run_skips_finished_urls() {
    let mut stores = Stores::new();
    let urls = article_urls("a.com", "news", 50);
    seed_urls(&stores, &urls);

    let first = Arc::new(ScriptedScraper::new().with_behavior(&urls[7], Behavior::FailPermanently));
    let report = pipeline(&stores, scripted(&first), StopSignal::new())
        .run(&sport(), 6, 3)
        .await
        .unwrap();

    assert_eq!(report.success, 49);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert!(!report.interrupted);
    assert!(report.errors.contains_key(&urls[7]));
    assert_eq!(first.total_attempts(), 50);
    assert_eq!(stores.articles.count("sport").unwrap(), 49);

    stores.reopen_checkpoint();
    let second = Arc::new(ScriptedScraper::new());
    let report = pipeline(&stores, scripted(&second), StopSignal::new())
        .run(&sport(), 6, 3)
        .await
        .unwrap();

    assert_eq!(report.success, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 50);
    assert_eq!(report.per_category["sport"].queued, 0);
    assert_eq!(second.total_attempts(), 0);
}

#[tokio::test]
async fn test_reset_reprocesses_every_url() {
    let mut stores = Stores::new();
    let urls = article_urls("a.com", "news", 50);
    seed_urls(&stores, &urls);

    let first = Arc::new(ScriptedScraper::new().with_behavior(&urls[0], Behavior::FailPermanently));
    pipeline(&stores, scripted(&first), StopSignal::new())
        .run(&sport(), 6, 3)
        .await
        .unwrap();

    stores.checkpoint.reset().unwrap();
    stores.reopen_checkpoint();
    assert_eq!(stores.checkpoint.counts(None).total(), 0);

    let again = Arc::new(ScriptedScraper::new());
    let report = pipeline(&stores, scripted(&again), StopSignal::new())
        .run(&sport(), 6, 3)
        .await
        .unwrap();

    assert_eq!(again.total_attempts(), 50);
    assert!(urls.iter().all(|u| again.attempts(u) == 1));
    assert_eq!(report.success, 50);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_transient_failure_is_attempted_max_retries_plus_one_times() {
    let stores = Stores::new();
    let urls = article_urls("a.com", "news", 3);
    seed_urls(&stores, &urls);

    let scraper = Arc::new(ScriptedScraper::new().with_behavior(&urls[1], Behavior::FailTransiently));
    let report = pipeline(&stores, scripted(&scraper), StopSignal::new())
        .run(&sport(), 2, 2)
        .await
        .unwrap();

    assert_eq!(scraper.attempts(&urls[1]), 3);
    assert_eq!(scraper.attempts(&urls[0]), 1);
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 2);

    let entry = stores.checkpoint.entry(&urls[1]).unwrap();
    assert_eq!(entry.status, CheckpointStatus::Failed);
    assert_eq!(entry.retry_count, 3);
    assert!(entry.error.is_some());
}

#[tokio::test]
async fn test_dropped_connection_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });

    let stores = Stores::new();
    let url = format!("http://{}/news/hang-up", addr);
    seed_urls(&stores, &[url.clone()]);

    let report = pipeline(&stores, CapabilityRegistry::new(), StopSignal::new())
        .run(&sport(), 1, 2)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 2);
    assert!(accepted.load(Ordering::SeqCst) >= 3);

    let entry = stores.checkpoint.entry(&url).unwrap();
    assert_eq!(entry.status, CheckpointStatus::Failed);
    assert_eq!(entry.retry_count, 3);
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let stores = Stores::new();
    let urls = article_urls("a.com", "news", 50);
    seed_urls(&stores, &urls);

    let scraper = Arc::new(ScriptedScraper::new().with_delay(Duration::from_millis(10)));
    let report = pipeline(&stores, scripted(&scraper), StopSignal::new())
        .run(&sport(), 6, 0)
        .await
        .unwrap();

    assert_eq!(report.success, 50);
    assert!(scraper.peak() <= 6, "peak was {}", scraper.peak());
    assert!(scraper.peak() >= 2, "peak was {}", scraper.peak());
    assert!(report.peak_concurrency <= 6);
}

#[tokio::test]
async fn test_stop_drains_in_flight_work() {
    let mut stores = Stores::new();
    let urls = article_urls("a.com", "news", 50);
    seed_urls(&stores, &urls);

    let stop = StopSignal::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        trigger.stop();
    });

    let scraper = Arc::new(ScriptedScraper::new().with_delay(Duration::from_millis(40)));
    let first = pipeline(&stores, scripted(&scraper), stop)
        .run(&sport(), 2, 3)
        .await
        .unwrap();

    assert!(first.interrupted);
    assert!(first.success >= 1);
    assert!(first.success < 50);

    let counts = stores.checkpoint.counts(Some(urls.as_slice()));
    assert_eq!(counts.in_progress, 0);
    assert_eq!(counts.success, first.success);
    assert_eq!(counts.pending, 50 - first.success);

    stores.reopen_checkpoint();
    assert_eq!(stores.checkpoint.counts(Some(urls.as_slice())).success, first.success);

    let rest = Arc::new(ScriptedScraper::new());
    let second = pipeline(&stores, scripted(&rest), StopSignal::new())
        .run(&sport(), 6, 3)
        .await
        .unwrap();

    assert!(!second.interrupted);
    assert_eq!(second.skipped, first.success);
    assert_eq!(second.success, 50 - first.success);
}

#[tokio::test]
async fn test_site_profile_scrapes_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/news/big-story"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Site | Big Story</title></head><body>\
             <h1>Site banner</h1>\
             <h2 class=\"headline\">Big Story</h2>\
             <div class=\"story\"><p>First.</p><p></p><p>Second.</p></div>\
             </body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/news/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/news/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let stores = Stores::new();
    let story = format!("{}/news/big-story", server.uri());
    let missing = format!("{}/news/missing", server.uri());
    let flaky = format!("{}/news/flaky", server.uri());
    seed_urls(&stores, &[story.clone(), missing.clone(), flaky.clone()]);

    let mut registry = CapabilityRegistry::new();
    registry.register_profile(&SiteProfile::new("local", "127.0.0.1", "h2.headline", "div.story"));

    let report = pipeline(&stores, registry, StopSignal::new())
        .run(&sport(), 2, 1)
        .await
        .unwrap();

    assert_eq!(report.success, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.retried, 1);
    assert!(report.errors[&missing].contains("404"));

    let content =
        std::fs::read_to_string(stores.articles.article_path("sport", &story)).unwrap();
    let article: ArticleRecord = serde_json::from_str(&content).unwrap();
    assert_eq!(article.title, "Big Story");
    assert_eq!(article.body, "First.\n\nSecond.");
    assert_eq!(article.extractor, "local");
    assert_eq!(article.source, "127.0.0.1");
    assert_eq!(article.category, "sport");

    let missing_entry = stores.checkpoint.entry(&missing).unwrap();
    assert_eq!(missing_entry.status, CheckpointStatus::Failed);
    assert_eq!(missing_entry.retry_count, 1);
}
