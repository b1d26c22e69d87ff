//! Full jobs through the harvest service against a mock news site

use crate::common::{article_html, listing_html};
use news_harvest::config::{parse_categories, Pagination, Settings, SourceSettings};
use news_harvest::output::{format_outcome, load_statistics};
use news_harvest::storage::{StoreLayout, UrlStore};
use news_harvest::{HarvestService, Job, RunContext, ServiceState};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn news_site() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sport/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            listing_html(&["/news/one", "/news/two", "/news/three", "/author/editor"]),
            "text/html",
        ))
        .mount(&server)
        .await;

    for (slug, title) in [("one", "Match One"), ("two", "Match Two"), ("three", "Match Three")] {
        Mock::given(method("GET"))
            .and(path(format!("/news/{}", slug)))
            .respond_with(ResponseTemplate::new(200).set_body_raw(article_html(title), "text/html"))
            .mount(&server)
            .await;
    }

    server
}

fn context(server: &MockServer, dir: &TempDir) -> RunContext {
    let mut settings = Settings::default();
    settings.crawler.urls_per_category = 10;
    settings.crawler.min_urls_per_source = 1;
    settings.extractor.retry_delay_ms = 0;
    settings.source.push(SourceSettings {
        domain: "127.0.0.1".to_string(),
        pagination: Pagination::None,
        max_pages: 1,
        article_patterns: vec!["/news/".to_string()],
    });

    let categories = parse_categories(
        format!(r#"{{"sport": ["{}/sport/"]}}"#, server.uri()).as_bytes(),
        &settings,
    )
    .unwrap();

    RunContext::open(settings, categories, StoreLayout::new(dir.path())).unwrap()
}

#[tokio::test]
async fn test_all_job_crawls_then_extracts() {
    let server = news_site().await;
    let dir = TempDir::new().unwrap();
    let service = HarvestService::new(context(&server, &dir));

    let job = Job::All {
        resume: false,
        reset_checkpoint: false,
    };
    let outcome = service.run(job).await.unwrap();

    assert!(!outcome.interrupted);
    assert_eq!(outcome.crawl.len(), 1);
    assert_eq!(outcome.crawl[0].collected, 3);
    assert!(!outcome.crawl[0].quota_reached);

    let report = outcome.extraction.as_ref().unwrap();
    assert_eq!(report.success, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(
        service.status(),
        ServiceState::Finished {
            job,
            interrupted: false
        }
    );

    let ctx = service.context();
    let stats = load_statistics(
        ctx.urls.as_ref(),
        ctx.checkpoint.as_ref(),
        ctx.articles.as_ref(),
        &ctx.category_names(),
    )
    .unwrap();
    assert_eq!(stats.total_urls, 3);
    assert_eq!(stats.total_articles, 3);
    assert_eq!(stats.totals.success, 3);

    assert!(dir.path().join("urls/sport.json").is_file());
    assert!(dir.path().join("checkpoint.json").is_file());

    let text = format_outcome(&outcome);
    assert!(text.contains("sport: 3 URLs"));
    assert!(text.contains("success: 3"));
}

#[tokio::test]
async fn test_rerun_after_restart_does_no_new_work() {
    let server = news_site().await;
    let dir = TempDir::new().unwrap();

    let first = HarvestService::new(context(&server, &dir));
    first
        .run(Job::All {
            resume: false,
            reset_checkpoint: false,
        })
        .await
        .unwrap();

    let second = HarvestService::new(context(&server, &dir));
    assert_eq!(second.context().urls.count("sport"), 3);

    let crawl = second.run(Job::Crawl { resume: true }).await.unwrap();
    assert_eq!(crawl.crawl[0].added, 0);
    assert_eq!(crawl.crawl[0].collected, 3);

    let extract = second
        .run(Job::Extract {
            reset_checkpoint: false,
        })
        .await
        .unwrap();
    let report = extract.extraction.unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.success, 0);

    let reset = second
        .run(Job::Extract {
            reset_checkpoint: true,
        })
        .await
        .unwrap();
    assert_eq!(reset.extraction.unwrap().success, 3);
}

#[tokio::test]
async fn test_corrupt_checkpoint_is_set_aside() {
    let server = news_site().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("checkpoint.json"), "{ not json").unwrap();

    let service = HarvestService::new(context(&server, &dir));
    let outcome = service
        .run(Job::All {
            resume: false,
            reset_checkpoint: false,
        })
        .await
        .unwrap();

    let report = outcome.extraction.unwrap();
    assert!(report.checkpoint_recovered);
    assert_eq!(report.success, 3);

    let backups = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("checkpoint.json.corrupt-")
        })
        .count();
    assert_eq!(backups, 1);
}
