//! Fetch strategies
//!
//! This module turns a request into a UTF-8 body:
//! - The `Fetcher` trait workers call
//! - `HttpFetcher`, a plain GET with a timeout
//! - `BrowserFetcher`, a GET dressed up as a desktop browser, with the task's cookie
//!   and an optional proxy
//! - Charset detection and decoding shared by both

use crate::config::{FetcherConfig, FetcherKind};
use crate::crawler::Request;
use crate::FetchError;
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, Proxy, Response};
use std::sync::Arc;
use std::time::Duration;

/// User agent sent by `HttpFetcher`
pub const DEFAULT_USER_AGENT: &str = concat!("spindle/", env!("CARGO_PKG_VERSION"));

/// User agent sent by `BrowserFetcher` unless configured otherwise
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// Number of leading body bytes searched for a `<meta charset>`
const SNIFF_LEN: usize = 1024;

/// Turns a request into a response body
///
/// Implementations are shared by all workers and must be safe to call concurrently.
/// Retries and timeouts are the fetcher's own business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError>;
}

/// Plain HTTP GET
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| classify(&request.url, e))?;

        read_body(&request.url, response).await
    }
}

/// HTTP GET that looks like a desktop browser
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    client: Client,
    user_agent: String,
}

impl BrowserFetcher {
    /// Creates a browser-like fetcher
    ///
    /// # Arguments
    ///
    /// * `config` - Timeout, user agent and optional proxy URL
    ///
    /// # Returns
    ///
    /// * `Ok(BrowserFetcher)` - Client built
    /// * `Err(FetchError)` - The proxy URL or client settings were rejected
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        let user_agent = if config.user_agent.is_empty() {
            BROWSER_USER_AGENT.to_string()
        } else {
            config.user_agent.clone()
        };

        Ok(Self {
            client: builder.build()?,
            user_agent,
        })
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(USER_AGENT, &self.user_agent);

        let cookie = &request.task.property.cookie;
        if !cookie.is_empty() {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&request.url, e))?;

        read_body(&request.url, response).await
    }
}

/// Builds the fetcher named by a task's `fetcher` setting
pub fn build_fetcher(
    kind: FetcherKind,
    config: &FetcherConfig,
) -> Result<Arc<dyn Fetcher>, FetchError> {
    let fetcher: Arc<dyn Fetcher> = match kind {
        FetcherKind::Http => Arc::new(HttpFetcher::new(Duration::from_millis(
            config.timeout_ms,
        ))?),
        FetcherKind::Browser => Arc::new(BrowserFetcher::new(config)?),
    };
    Ok(fetcher)
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}

async fn read_body(url: &str, response: Response) -> Result<Vec<u8>, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(|e| classify(url, e))?;
    Ok(decode_body(&bytes, content_type.as_deref()))
}

/// Decodes a response body to UTF-8
///
/// The charset comes from the `Content-Type` header, else from a `charset=` in the
/// first 1024 bytes of the body, else UTF-8 is assumed. A byte order mark wins over
/// all of these.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Vec<u8> {
    let encoding = content_type
        .and_then(charset_label)
        .or_else(|| sniff_charset(&bytes[..bytes.len().min(SNIFF_LEN)]))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned().into_bytes()
}

/// Pulls the value of a `charset=` parameter out of a header or markup fragment
fn charset_label(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let label: String = lower[start..]
        .trim_start_matches(&['"', '\'', ' '][..])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

fn sniff_charset(head: &[u8]) -> Option<String> {
    charset_label(&String::from_utf8_lossy(head))
}
