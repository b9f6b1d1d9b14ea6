//! Crawls against a mock HTTP server
//!
//! These tests use wiremock to serve small sites and run the full cycle: HTTP fetch,
//! link extraction, SQLite storage.

use scraper::{Html, Selector};
use serde_json::Value;
use spindle::config::{build_seeds, configure_engine, parse_config};
use spindle::crawler::{
    Context, Engine, HttpFetcher, ParseResult, Property, Request, Rule, RuleTree, Seed, Task,
    TaskRegistry,
};
use spindle::storage::{open_storage, SqliteStorage, Storage};
use spindle::ParseError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A task that starts at `root`, stores each page's title and follows every link
fn create_site_task(root: String, max_depth: u32) -> Task {
    Task::new(
        Property {
            name: "site".to_string(),
            url: root.clone(),
            max_depth,
            ..Property::default()
        },
        RuleTree::new(move |task| Ok(vec![Request::new(task, root.as_str(), "page")]))
            .rule("page", Rule::new(parse_page).with_fields(&["title"])),
    )
}

fn parse_page(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    let title = {
        let document = Html::parse_document(&ctx.body_text());
        let selector =
            Selector::parse("title").map_err(|e| ParseError::Selector(format!("{:?}", e)))?;
        document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>())
            .unwrap_or_default()
    };

    let requests = ctx
        .links("a[href]")?
        .into_iter()
        .map(|url| ctx.follow(url, "page"))
        .collect();

    let mut data = BTreeMap::new();
    data.insert("title".to_string(), Value::from(title));
    Ok(ParseResult {
        requests,
        items: vec![ctx.output(data)],
    })
}

fn page(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    ResponseTemplate::new(200)
        .set_body_string(format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, anchors
        ))
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, at: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(page(title, links))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", "Home", &["/page1", "/page2"]).await;
    mount_page(&mock_server, "/page1", "Page 1", &["/", "/page2"]).await;
    mount_page(&mock_server, "/page2", "Page 2", &[]).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("items.db");
    let storage = Arc::new(open_storage(&db_path, 100).expect("Failed to open DB"));

    let engine = Engine::builder(Arc::new(
        TaskRegistry::new().with(create_site_task(format!("{}/", base_url), 3)),
    ))
    .worker_count(3)
    .min_content_length(1)
    .build();
    let seed = Seed::new("site")
        .with_fetcher(Arc::new(
            HttpFetcher::new(Duration::from_secs(2)).expect("Failed to build client"),
        ))
        .with_storage(storage.clone());

    let report = engine
        .run(vec![seed], CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.stats.fetched, 3);
    assert!(report.failures.is_empty());

    let reopened = SqliteStorage::new(&db_path, 1).expect("Failed to reopen DB");
    assert_eq!(reopened.row_count("site").expect("Failed to count rows"), 3);

    let mut titles = reopened
        .column_values("site", "title")
        .expect("Failed to read titles");
    titles.sort();
    assert_eq!(titles, vec!["Home", "Page 1", "Page 2"]);
}

#[tokio::test]
async fn test_crawl_with_depth_limit() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // / -> level1 -> level2 -> level3
    mount_page(&mock_server, "/", "Root", &["/level1"]).await;
    mount_page(&mock_server, "/level1", "Level 1", &["/level2"]).await;
    mount_page(&mock_server, "/level2", "Level 2", &["/level3"]).await;

    Mock::given(method("GET"))
        .and(path("/level3"))
        .respond_with(page("Level 3", &[]))
        .expect(0)
        .mount(&mock_server)
        .await;

    let engine = Engine::builder(Arc::new(
        TaskRegistry::new().with(create_site_task(format!("{}/", base_url), 2)),
    ))
    .min_content_length(1)
    .build();
    let seed = Seed::new("site").with_fetcher(Arc::new(
        HttpFetcher::new(Duration::from_secs(2)).expect("Failed to build client"),
    ));

    let report = engine
        .run(vec![seed], CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.stats.fetched, 3);
    assert_eq!(report.stats.depth_exceeded, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", "Root", &["/gone"]).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let engine = Engine::builder(Arc::new(
        TaskRegistry::new().with(create_site_task(format!("{}/", base_url), 2)),
    ))
    .min_content_length(1)
    .build();
    let seed = Seed::new("site").with_fetcher(Arc::new(
        HttpFetcher::new(Duration::from_secs(2)).expect("Failed to build client"),
    ));

    let report = engine
        .run(vec![seed], CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.stats.dropped_after_retry, 1);
    assert_eq!(report.failures.urls(), vec![format!("{}/gone", base_url)]);
}

#[tokio::test]
async fn test_seeds_from_config() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", "Home", &["/about"]).await;
    mount_page(&mock_server, "/about", "About", &[]).await;

    let config = parse_config(
        r#"
[engine]
worker-count = 2
min-content-length = 1

[[task]]
name = "site"
max-depth = 0
"#,
    )
    .expect("Failed to parse config");

    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::in_memory(1).expect("Failed to open in-memory DB"),
    );
    let seeds = build_seeds(&config, Some(storage)).expect("Failed to build seeds");
    let engine = configure_engine(
        Engine::builder(Arc::new(
            TaskRegistry::new().with(create_site_task(format!("{}/", base_url), 5)),
        )),
        &config.engine,
    )
    .build();

    assert_eq!(engine.worker_count(), 2);

    let report = engine
        .run(seeds, CancellationToken::new())
        .await
        .expect("Crawl failed");

    // The seed's max-depth overrides the task's own limit
    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.depth_exceeded, 1);
    assert_eq!(report.stats.items, 1);
}
