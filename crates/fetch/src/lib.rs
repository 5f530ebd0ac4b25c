pub mod file;

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Response};
use thiserror::Error;
use tracing::debug;
use url::Url;

use linkrot_extract::{scan_html, scan_markdown, Extraction};

/// Statuses that make a HEAD probe fall back to a single GET.
const HEAD_FALLBACK_STATUSES: &[u16] = &[404, 405, 501];

/// Cap on captured body excerpts for failure diagnostics.
const BODY_EXCERPT_LIMIT: usize = 256;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("extraction worker failed: {0}")]
    Extract(String),
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Client-level knobs shared by every request of one crawl.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

/// One shared client per crawl; an unparsable header name or value is a
/// configuration error, surfaced before any work starts.
pub fn build_client(config: &ClientConfig) -> Result<Client, FetchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::Client(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::Client(format!("header {name:?}: {e}")))?;
        headers.insert(name, value);
    }
    if let Some(agent) = &config.user_agent {
        let value = HeaderValue::from_str(agent)
            .map_err(|e| FetchError::Client(format!("user agent: {e}")))?;
        headers.insert(USER_AGENT, value);
    }
    Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}

/// How a URL should be fetched.
#[derive(Debug, Clone, Copy)]
pub enum FetchMode {
    /// Availability probe: HEAD, with one GET fallback when the server
    /// does not honor HEAD.
    Probe,
    /// GET, streaming HTML (or rendering Markdown when enabled) through
    /// the link extractor.
    Extract { markdown: bool },
}

/// Outcome of one logical fetch attempt that produced a response.
#[derive(Debug, Default)]
pub struct FetchedDoc {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Parsed numeric `retry-after`, populated only for 429 responses.
    pub retry_after: Option<u64>,
    /// Links discovered in the body, when the mode asked for extraction
    /// and the content type allowed it.
    pub extraction: Option<Extraction>,
    /// First bytes of an error response body, for failure diagnostics.
    pub body_excerpt: Option<String>,
}

pub struct Fetcher {
    client: Client,
    timeout: Option<Duration>,
}

impl Fetcher {
    /// `timeout` is the per-request deadline; `None` disables it.
    pub fn new(client: Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    async fn send(&self, method: Method, url: &Url) -> Result<Response, reqwest::Error> {
        let mut request = self.client.request(method, url.clone());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request.send().await
    }

    /// Perform one logical attempt against an http(s) URL. Transport
    /// errors bubble up; any response, including 4xx/5xx, is returned as
    /// a [`FetchedDoc`] for the caller's retry policy to judge.
    pub async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<FetchedDoc, FetchError> {
        let (response, method) = match mode {
            FetchMode::Extract { .. } => {
                let response = self
                    .send(Method::GET, url)
                    .await
                    .map_err(FetchError::from_reqwest)?;
                (response, Method::GET)
            }
            FetchMode::Probe => match self.send(Method::HEAD, url).await {
                Ok(resp) if !HEAD_FALLBACK_STATUSES.contains(&resp.status().as_u16()) => {
                    (resp, Method::HEAD)
                }
                Ok(resp) => {
                    debug!(url = %url, status = resp.status().as_u16(), "HEAD not honored, retrying as GET");
                    let response = self
                        .send(Method::GET, url)
                        .await
                        .map_err(FetchError::from_reqwest)?;
                    (response, Method::GET)
                }
                Err(e) if e.is_timeout() => return Err(FetchError::Timeout),
                Err(e) => {
                    debug!(url = %url, "HEAD rejected ({e}), retrying as GET");
                    let response = self
                        .send(Method::GET, url)
                        .await
                        .map_err(FetchError::from_reqwest)?;
                    (response, Method::GET)
                }
            },
        };

        let status = response.status().as_u16();
        let headers = header_map(&response);
        let retry_after = if status == 429 {
            parse_retry_after(&headers)
        } else {
            None
        };

        let mut doc = FetchedDoc {
            status,
            headers,
            retry_after,
            ..FetchedDoc::default()
        };

        if status >= 400 {
            if method == Method::GET {
                doc.body_excerpt = read_excerpt(response).await;
            }
            return Ok(doc);
        }

        if let FetchMode::Extract { markdown } = mode {
            let content_type = doc.headers.get("content-type").map(String::as_str);
            if is_html(content_type) {
                doc.extraction = Some(stream_html(response).await?);
            } else if markdown && is_markdown(content_type, url) {
                let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
                doc.extraction = Some(scan_markdown(&body));
            }
            // Other content types: headers are enough, the body is
            // dropped unread.
        }

        Ok(doc)
    }
}

fn header_map(response: &Response) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    headers
}

/// Numeric-seconds form only; an HTTP-date value is treated as absent and
/// falls through to the no-header retry policy.
pub fn parse_retry_after(headers: &HashMap<String, String>) -> Option<u64> {
    headers.get("retry-after")?.trim().parse().ok()
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.map(|ct| ct.contains("text/html")).unwrap_or(true)
}

fn is_markdown(content_type: Option<&str>, url: &Url) -> bool {
    if content_type
        .map(|ct| ct.contains("markdown"))
        .unwrap_or(false)
    {
        return true;
    }
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".md") || path.ends_with(".markdown")
}

async fn read_excerpt(mut response: Response) -> Option<String> {
    let mut collected: Vec<u8> = Vec::new();
    while collected.len() < BODY_EXCERPT_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
            _ => break,
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.truncate(BODY_EXCERPT_LIMIT);
    Some(String::from_utf8_lossy(&collected).into_owned())
}

/// Pump the response body through the streaming tokenizer without holding
/// more than a chunk in memory. The tokenizer is synchronous, so it runs
/// on a blocking thread fed over a small channel.
async fn stream_html(mut response: Response) -> Result<Extraction, FetchError> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let scanner = tokio::task::spawn_blocking(move || {
        let mut rx = rx;
        scan_html(std::iter::from_fn(move || rx.blocking_recv()))
    });

    let mut read_error = None;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                read_error = Some(FetchError::from_reqwest(e));
                break;
            }
        }
    }
    drop(tx);

    let extraction = scanner
        .await
        .map_err(|e| FetchError::Extract(e.to_string()))?;
    match read_error {
        Some(e) => Err(e),
        None => Ok(extraction),
    }
}
