//! End-to-end engine runs against a scripted fetcher

use crate::common::{follow_all, link_task, tally, ScriptedFetcher};
use spindle::crawler::{Engine, Fingerprint, Overflow, QueuePolicy, Request, Seed, TaskRegistry};
use spindle::limiter::{per, TokenBucket};
use spindle::storage::MemoryStorage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const SITE: &str = "https://site.test";

fn url(path: &str) -> String {
    format!("{}/{}", SITE, path)
}

fn fingerprint(path: &str) -> Fingerprint {
    Fingerprint::of(&url(path), "GET")
}

fn single_root(path: &str) -> Vec<(String, i32)> {
    vec![(url(path), 0)]
}

#[tokio::test]
async fn test_depth_limit_across_roots() {
    let task = link_task(
        "tree",
        vec![(url("a"), 1), (url("b"), 1), (url("c"), 1)],
        1,
        |ctx| {
            let base = &ctx.req.url;
            follow_all(ctx, &[format!("{}/1", base), format!("{}/2", base)])
        },
    );
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(3)
        .min_content_length(1)
        .storage(storage.clone())
        .build();

    let report = engine
        .run(
            vec![Seed::new("tree").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    // 3 roots at depth 0, 6 children at depth 1, 12 grandchildren dropped
    assert_eq!(fetcher.total_calls(), 9);
    assert_eq!(report.stats.fetched, 9);
    assert_eq!(report.stats.depth_exceeded, 12);
    assert_eq!(report.visited.len(), 9);
    assert_eq!(storage.len(), 9);
    assert_eq!(fetcher.calls(&url("a/1/1")), 0);
    assert!(!report.cancelled);
}

#[tokio::test]
async fn test_duplicates_fetched_once() {
    let dup = url("dup");
    let root = url("");
    let task = link_task("dups", single_root(""), 5, move |ctx| {
        if ctx.req.url == dup {
            follow_all(ctx, &[root.clone(), dup.clone()])
        } else {
            follow_all(ctx, &vec![dup.clone(); 20])
        }
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(4)
        .min_content_length(1)
        .build();

    let report = engine
        .run(
            vec![Seed::new("dups").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    let order = fetcher.order();
    let counts = tally(&order);
    assert_eq!(counts.get(url("dup").as_str()), Some(&1));
    assert_eq!(counts.get(url("").as_str()), Some(&1));
    assert_eq!(report.stats.duplicates, 21);
    assert_eq!(report.visited.len(), 2);
}

#[tokio::test]
async fn test_retry_once_then_success() {
    let flaky = url("flaky");
    let task = link_task("retry", single_root(""), 2, {
        let flaky = flaky.clone();
        move |ctx| {
            if ctx.req.depth == 0 {
                follow_all(ctx, &[flaky.clone()])
            } else {
                vec![]
            }
        }
    });
    let fetcher = Arc::new(ScriptedFetcher::new().fail_once(&flaky));
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .build();

    let report = engine
        .run(
            vec![Seed::new("retry")
                .with_fetcher(fetcher.clone())
                .with_storage(storage.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.calls(&flaky), 2);
    assert_eq!(report.stats.retries, 1);
    assert_eq!(report.stats.dropped_after_retry, 0);
    assert!(report.failures.contains(&fingerprint("flaky")));
    assert!(report.visited.contains(&fingerprint("flaky")));
    assert_eq!(storage.items_for("retry").len(), 2);
}

#[tokio::test]
async fn test_second_failure_is_terminal() {
    let broken = url("broken");
    let task = link_task("terminal", single_root(""), 2, {
        let broken = broken.clone();
        move |ctx| {
            if ctx.req.depth == 0 {
                follow_all(ctx, &[broken.clone()])
            } else {
                vec![]
            }
        }
    });
    let fetcher = Arc::new(ScriptedFetcher::new().fail_always(&broken));
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .build();

    let report = engine
        .run(
            vec![Seed::new("terminal").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.calls(&broken), 2);
    assert_eq!(report.stats.fetch_failures, 2);
    assert_eq!(report.stats.retries, 1);
    assert_eq!(report.stats.dropped_after_retry, 1);
    assert!(report.failures.contains(&fingerprint("broken")));
    assert!(!report.visited.contains(&fingerprint("broken")));
    assert_eq!(report.failures.urls(), vec![broken]);
}

#[tokio::test]
async fn test_parse_error_gets_one_retry() {
    let task = link_task("parse", single_root("bad"), 1, |_| vec![]);
    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .build();

    let report = engine
        .run(
            vec![Seed::new("parse").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.calls(&url("bad")), 2);
    assert_eq!(report.stats.parse_failures, 2);
    assert_eq!(report.stats.dropped_after_retry, 1);
    assert_eq!(report.stats.items, 0);
}

#[tokio::test]
async fn test_unknown_rule_is_not_retried() {
    let task = link_task("rules", single_root(""), 2, |ctx| {
        vec![ctx.follow(format!("{}/orphan", SITE), "missing")]
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .build();

    let report = engine
        .run(
            vec![Seed::new("rules").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.calls(&url("orphan")), 1);
    assert_eq!(report.stats.parse_failures, 1);
    assert_eq!(report.stats.retries, 0);
}

#[tokio::test]
async fn test_reload_bypasses_visited_set() {
    let make_task = || {
        link_task("loop", single_root("self"), 2, |ctx| {
            vec![ctx.follow(ctx.req.url.as_str(), "page")]
        })
    };

    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(make_task())))
        .min_content_length(1)
        .build();
    let report = engine
        .run(
            vec![Seed::new("loop")
                .with_fetcher(fetcher.clone())
                .with_reload(true)],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    // Depths 0, 1 and 2 are fetched; depth 3 is dropped
    assert_eq!(fetcher.calls(&url("self")), 3);
    assert_eq!(report.stats.duplicates, 0);
    assert_eq!(report.stats.depth_exceeded, 1);
    assert!(report.visited.is_empty());

    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(make_task())))
        .min_content_length(1)
        .build();
    let report = engine
        .run(
            vec![Seed::new("loop").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.calls(&url("self")), 1);
    assert_eq!(report.stats.duplicates, 1);
}

#[tokio::test]
async fn test_worker_survives_panic() {
    let task = link_task("panics", single_root(""), 1, |ctx| {
        if ctx.req.depth == 0 {
            follow_all(ctx, &[url("boom"), url("fine")])
        } else {
            vec![]
        }
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(1)
        .min_content_length(1)
        .storage(storage.clone())
        .build();

    let report = engine
        .run(
            vec![Seed::new("panics").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(report.stats.panics, 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(fetcher.calls(&url("boom")), 1);
    assert_eq!(fetcher.calls(&url("fine")), 1);
    assert_eq!(storage.len(), 2);
    assert!(!report.cancelled);
}

#[tokio::test]
async fn test_short_bodies_are_failures() {
    let make_engine = |min: Option<usize>| {
        let task = link_task("short", single_root(""), 0, |_| vec![]);
        let builder = Engine::builder(Arc::new(TaskRegistry::new().with(task)));
        match min {
            Some(min) => builder.min_content_length(min).build(),
            None => builder.build(),
        }
    };

    let fetcher = Arc::new(ScriptedFetcher::new().with_body(b"blocked"));
    let report = make_engine(None)
        .run(
            vec![Seed::new("short").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.total_calls(), 2);
    assert_eq!(report.stats.fetch_failures, 2);
    assert_eq!(report.stats.items, 0);

    let fetcher = Arc::new(ScriptedFetcher::new().with_body(b"blocked"));
    let report = make_engine(Some(7))
        .run(
            vec![Seed::new("short").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.total_calls(), 1);
    assert_eq!(report.stats.items, 1);
}

#[tokio::test]
async fn test_priority_children_run_first() {
    let task = link_task("priority", single_root(""), 1, |ctx| {
        if ctx.req.depth > 0 {
            return vec![];
        }
        vec![
            ctx.follow(url("n1"), "page"),
            ctx.follow(url("n2"), "page"),
            ctx.follow(url("p"), "page").with_priority(1),
        ]
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(1)
        .min_content_length(1)
        .build();

    engine
        .run(
            vec![Seed::new("priority").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(
        fetcher.order(),
        vec![url(""), url("p"), url("n1"), url("n2")]
    );
}

#[tokio::test]
async fn test_rate_limiter_spaces_fetches() {
    let task = link_task("limited", single_root(""), 1, |ctx| {
        if ctx.req.depth > 0 {
            return vec![];
        }
        let urls: Vec<String> = (0..4).map(|i| url(&i.to_string())).collect();
        follow_all(ctx, &urls)
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let limiter = Arc::new(TokenBucket::new(per(10, Duration::from_secs(1)), 1));
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(4)
        .min_content_length(1)
        .build();

    let start = Instant::now();
    engine
        .run(
            vec![Seed::new("limited")
                .with_fetcher(fetcher.clone())
                .with_limiter(limiter)],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(fetcher.total_calls(), 5);
    assert!(
        start.elapsed() >= Duration::from_millis(300),
        "five fetches at 10/s finished in {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_cancel_stops_a_stuck_crawl() {
    let task = link_task("stuck", single_root(""), 1, |_| vec![]);
    let fetcher = Arc::new(ScriptedFetcher::new().with_delay(Duration::from_secs(3600)));
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run(vec![Seed::new("stuck").with_fetcher(fetcher.clone())], cancel),
    )
    .await
    .expect("Engine did not stop after cancel")
    .expect("Crawl failed");

    assert!(report.cancelled);
    assert_eq!(fetcher.total_calls(), 1);
    assert_eq!(report.stats.fetched, 0);
}

#[tokio::test]
async fn test_tasks_share_one_run() {
    let books = link_task("books", single_root("books"), 0, |_| vec![]);
    let rooms = link_task("rooms", single_root("rooms"), 0, |_| vec![]);
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(books).with(rooms)))
        .worker_count(2)
        .min_content_length(1)
        .storage(storage.clone())
        .build();

    let report = engine
        .run(
            vec![
                Seed::new("books").with_fetcher(fetcher.clone()),
                Seed::new("rooms").with_fetcher(fetcher.clone()),
            ],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert_eq!(report.stats.fetched, 2);
    assert_eq!(storage.items_for("books").len(), 1);
    assert_eq!(storage.items_for("rooms").len(), 1);
}

#[tokio::test]
async fn test_requests_carry_their_task() {
    let task = link_task("owner", single_root(""), 1, |ctx| {
        assert_eq!(ctx.req.task_name(), "owner");
        let child: Request = ctx.follow(url("child"), "page");
        assert_eq!(child.task_name(), "owner");
        vec![child]
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .min_content_length(1)
        .storage(storage.clone())
        .build();

    engine
        .run(
            vec![Seed::new("owner").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        )
        .await
        .expect("Crawl failed");

    assert!(storage.items().iter().all(|item| item.task == "owner"));
    assert_eq!(storage.len(), 2);
}

#[tokio::test]
async fn test_bounded_blocking_queue_with_one_worker_completes() {
    let task = link_task("fanout", single_root("n"), 3, |ctx| {
        let base = &ctx.req.url;
        follow_all(ctx, &[format!("{}/0", base), format!("{}/1", base)])
    });
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::builder(Arc::new(TaskRegistry::new().with(task)))
        .worker_count(1)
        .queue_policy(QueuePolicy::bounded(1, Overflow::Block))
        .min_content_length(1)
        .storage(storage.clone())
        .build();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run(
            vec![Seed::new("fanout").with_fetcher(fetcher.clone())],
            CancellationToken::new(),
        ),
    )
    .await
    .expect("Crawl stalled on a full queue")
    .expect("Crawl failed");

    // 1 + 2 + 4 + 8 pages across depths 0 to 3
    assert_eq!(fetcher.total_calls(), 15);
    assert_eq!(report.stats.fetched, 15);
    assert_eq!(storage.len(), 15);
    assert!(!report.cancelled);
}
