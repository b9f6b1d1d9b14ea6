//! Shared test fixtures: a scripted fetcher and small link-following tasks

use async_trait::async_trait;
use serde_json::Value;
use spindle::crawler::{Context, Fetcher, ParseResult, Property, Request, Rule, RuleTree, Task};
use spindle::FetchError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fetcher that serves a fixed body and fails on cue
#[derive(Default)]
pub struct ScriptedFetcher {
    body: Vec<u8>,
    fail_once: HashSet<String>,
    fail_always: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            body: vec![b'x'; 16],
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    /// The first fetch of `url` fails, later ones succeed
    pub fn fail_once(mut self, url: &str) -> Self {
        self.fail_once.insert(url.to_string());
        self
    }

    pub fn fail_always(mut self, url: &str) -> Self {
        self.fail_always.insert(url.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches of `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Fetched URLs in fetch order
    pub fn order(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|u| **u == request.url).count();
            calls.push(request.url.clone());
            previous
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.fail_always.contains(&request.url)
            || (previous == 0 && self.fail_once.contains(&request.url));
        if failing {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: 503,
            });
        }
        Ok(self.body.clone())
    }
}

/// Builds the requests a page links to
pub type LinkFn = Arc<dyn Fn(&Context<'_>) -> Vec<Request> + Send + Sync>;

/// Follows every URL with the `page` rule
pub fn follow_all(ctx: &Context<'_>, urls: &[String]) -> Vec<Request> {
    urls.iter().map(|url| ctx.follow(url.as_str(), "page")).collect()
}

/// A task whose roots are `roots` and whose single `page` rule emits one item per
/// page plus the requests returned by `links`
///
/// A page whose URL contains `boom` panics; one containing `bad` fails to parse.
pub fn link_task<F>(name: &str, roots: Vec<(String, i32)>, max_depth: u32, links: F) -> Task
where
    F: Fn(&Context<'_>) -> Vec<Request> + Send + Sync + 'static,
{
    let links: LinkFn = Arc::new(links);

    Task::new(
        Property {
            name: name.to_string(),
            max_depth,
            ..Property::default()
        },
        RuleTree::new(move |task| {
            Ok(roots
                .iter()
                .map(|(url, priority)| Request::new(task, url.as_str(), "page").with_priority(*priority))
                .collect())
        })
        .rule(
            "page",
            Rule::new(move |ctx| {
                if ctx.req.url.contains("boom") {
                    panic!("parser exploded on {}", ctx.req.url);
                }
                if ctx.req.url.contains("bad") {
                    return Err(spindle::ParseError::Message(format!(
                        "unexpected markup at {}",
                        ctx.req.url
                    )));
                }

                let mut data = BTreeMap::new();
                data.insert("page".to_string(), Value::from(ctx.req.url.as_str()));
                Ok(ParseResult {
                    requests: links(ctx),
                    items: vec![ctx.output(data)],
                })
            })
            .with_fields(&["page"]),
        ),
    )
}

/// Counts how often each URL appears
pub fn tally(urls: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for url in urls {
        *counts.entry(url.as_str()).or_insert(0) += 1;
    }
    counts
}
