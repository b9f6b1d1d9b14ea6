//! Crawl tasks, rule trees and seeds
//!
//! A `Task` bundles a site-level policy (`Property`), a `RuleTree` describing how to
//! produce root requests and parse responses, and the runtime collaborators that
//! fetch pages, store items and pace requests. Tasks are registered once by name; a
//! `Seed` later binds collaborators onto a registered task for one crawl run.

use crate::crawler::{Context, Fetcher, ParseResult, Request};
use crate::limiter::RateLimiter;
use crate::storage::Storage;
use crate::ParseError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Produces a task's initial requests
pub type RootFn = Arc<dyn Fn(&Arc<Task>) -> Result<Vec<Request>, ParseError> + Send + Sync>;

/// Parses a fetched body into discovered requests and items
pub type ParseFn = Arc<dyn Fn(&Context<'_>) -> Result<ParseResult, ParseError> + Send + Sync>;

/// Site-level crawl policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    /// Unique task name
    pub name: String,

    /// Site root URL
    pub url: String,

    /// Cookie header sent by fetchers that support it
    pub cookie: String,

    /// Upper bound of the random pause before each fetch
    pub wait_time: Duration,

    /// If true, every request is processed again even when already visited
    pub reload: bool,

    /// Requests deeper than this are dropped before fetch
    pub max_depth: u32,
}

/// A named parse strategy
#[derive(Clone)]
pub struct Rule {
    /// Ordered field names of the items this rule produces
    pub item_fields: Vec<String>,

    /// The parse function
    pub parse: ParseFn,
}

impl Rule {
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<ParseResult, ParseError> + Send + Sync + 'static,
    {
        Self {
            item_fields: Vec::new(),
            parse: Arc::new(parse),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.item_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("item_fields", &self.item_fields)
            .finish_non_exhaustive()
    }
}

/// Root producer plus the table of rules keyed by name
#[derive(Clone)]
pub struct RuleTree {
    root: RootFn,
    trunk: HashMap<String, Rule>,
}

impl RuleTree {
    pub fn new<F>(root: F) -> Self
    where
        F: Fn(&Arc<Task>) -> Result<Vec<Request>, ParseError> + Send + Sync + 'static,
    {
        Self {
            root: Arc::new(root),
            trunk: HashMap::new(),
        }
    }

    /// Adds (or replaces) a rule
    pub fn rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.trunk.insert(name.into(), rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.trunk.get(name)
    }

    /// Returns the rule names in sorted order
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trunk.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for RuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTree")
            .field("rules", &self.rule_names())
            .finish_non_exhaustive()
    }
}

/// A registered crawl task
#[derive(Clone)]
pub struct Task {
    pub property: Property,
    pub rules: RuleTree,
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub storage: Option<Arc<dyn Storage>>,
    pub limiter: Option<Arc<dyn RateLimiter>>,
}

impl Task {
    /// Creates a task with no collaborators bound
    pub fn new(property: Property, rules: RuleTree) -> Self {
        Self {
            property,
            rules,
            fetcher: None,
            storage: None,
            limiter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.property.name
    }

    /// Returns a copy of this task with the seed's collaborators and overrides applied
    pub fn bind(&self, seed: &Seed) -> Task {
        let mut task = self.clone();

        if let Some(fetcher) = &seed.fetcher {
            task.fetcher = Some(Arc::clone(fetcher));
        }
        if let Some(storage) = &seed.storage {
            task.storage = Some(Arc::clone(storage));
        }
        if let Some(limiter) = &seed.limiter {
            task.limiter = Some(Arc::clone(limiter));
        }
        if let Some(wait_time) = seed.wait_time {
            task.property.wait_time = wait_time;
        }
        if let Some(reload) = seed.reload {
            task.property.reload = reload;
        }
        if let Some(max_depth) = seed.max_depth {
            task.property.max_depth = max_depth;
        }
        if let Some(cookie) = &seed.cookie {
            task.property.cookie = cookie.clone();
        }

        task
    }

    /// Runs the root producer and stamps every root request with this task
    pub fn roots(self: &Arc<Self>) -> Result<Vec<Request>, ParseError> {
        let mut requests = (self.rules.root)(self)?;
        for request in &mut requests {
            request.task = Arc::clone(self);
        }
        Ok(requests)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("property", &self.property)
            .field("rules", &self.rules)
            .field("fetcher", &self.fetcher.is_some())
            .field("storage", &self.storage.is_some())
            .field("limiter", &self.limiter.is_some())
            .finish()
    }
}

/// Runtime collaborators and policy overrides for one registered task
#[derive(Clone, Default)]
pub struct Seed {
    /// Name of the registered task
    pub name: String,
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub storage: Option<Arc<dyn Storage>>,
    pub limiter: Option<Arc<dyn RateLimiter>>,
    pub wait_time: Option<Duration>,
    pub reload: Option<bool>,
    pub max_depth: Option<u32>,
    pub cookie: Option<String>,
}

impl Seed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("name", &self.name)
            .field("fetcher", &self.fetcher.is_some())
            .field("storage", &self.storage.is_some())
            .field("limiter", &self.limiter.is_some())
            .field("wait_time", &self.wait_time)
            .field("reload", &self.reload)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
