//! Parse context and HTML helpers for rule authors
//!
//! Every parse function receives a `Context` holding the fetched body and the request
//! that produced it, and returns a `ParseResult` of discovered requests and items.
//! The context offers helpers for following links, emitting items and selecting links
//! with CSS selectors.

use crate::crawler::Request;
use crate::storage::Item;
use crate::ParseError;
use chrono::Utc;
use scraper::{Html, Selector};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use url::Url;

/// Output of parsing one fetched body
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Newly discovered requests, in discovery order
    pub requests: Vec<Request>,

    /// Extracted data records, in extraction order
    pub items: Vec<Item>,
}

impl ParseResult {
    /// A result carrying only requests
    pub fn with_requests(requests: Vec<Request>) -> Self {
        Self {
            requests,
            items: Vec::new(),
        }
    }

    /// A result carrying only items
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            requests: Vec::new(),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.items.is_empty()
    }
}

/// What a parse function sees: the body and the request it answers
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub body: &'a [u8],
    pub req: &'a Request,
}

impl<'a> Context<'a> {
    pub fn new(body: &'a [u8], req: &'a Request) -> Self {
        Self { body, req }
    }

    /// Returns the body as text, replacing invalid UTF-8
    pub fn body_text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.body)
    }

    /// Creates a child request of the current one, handled by `rule_name`
    pub fn follow(&self, url: impl Into<String>, rule_name: impl Into<String>) -> Request {
        self.req.child(url, rule_name)
    }

    /// Wraps extracted data into an item tagged with this request's task, rule and URL
    ///
    /// The item's field order comes from the current rule's `item_fields`; when the rule
    /// declares none, the data keys are used in sorted order.
    pub fn output(&self, data: BTreeMap<String, Value>) -> Item {
        let fields = self
            .req
            .task
            .rules
            .get(&self.req.rule_name)
            .map(|rule| rule.item_fields.clone())
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| data.keys().cloned().collect());

        Item {
            task: self.req.task_name().to_string(),
            rule: self.req.rule_name.clone(),
            url: self.req.url.clone(),
            time: Utc::now(),
            fields,
            data,
        }
    }

    /// Returns a string from the request's temporary data
    pub fn tmp_str(&self, key: &str) -> Result<&'a str, ParseError> {
        self.req
            .tmp_data
            .as_ref()
            .and_then(|data| data.get_str(key))
            .ok_or_else(|| ParseError::MissingTmpData(key.to_string()))
    }

    /// Selects `href`s matching a CSS selector, resolved against the request URL
    ///
    /// `javascript:`, `mailto:`, `tel:` and `data:` links are skipped, as are links that
    /// do not resolve to an absolute http(s) URL.
    pub fn links(&self, selector: &str) -> Result<Vec<String>, ParseError> {
        let base = Url::parse(&self.req.url).ok();
        extract_links(&self.body_text(), selector, base.as_ref())
    }
}

/// Extracts links matching `selector` from an HTML document
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `selector` - CSS selector of elements carrying an `href`
/// * `base_url` - Base URL for resolving relative links, if known
///
/// # Example
///
/// ```
/// use spindle::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a class="tag" href="/tag/sf">SF</a><a href="mailto:x@y.z">mail</a>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// let links = extract_links(html, "a[href]", Some(&base)).unwrap();
/// assert_eq!(links, vec!["https://example.com/tag/sf".to_string()]);
/// ```
pub fn extract_links(
    html: &str,
    selector: &str,
    base_url: Option<&Url>,
) -> Result<Vec<String>, ParseError> {
    let selector =
        Selector::parse(selector).map_err(|e| ParseError::Selector(format!("{selector}: {e:?}")))?;
    let document = Html::parse_document(html);

    let links = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect();

    Ok(links)
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: and data: schemes
/// - fragment-only links
/// - relative links when no base URL is known
fn resolve_link(href: &str, base_url: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = match base_url {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}
