use std::collections::HashMap;

use serde::Serialize;

/// Final disposition of a checked URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkState {
    Ok,
    Broken,
    Skipped,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LinkState::Ok => "OK",
            LinkState::Broken => "BROKEN",
            LinkState::Skipped => "SKIPPED",
        })
    }
}

/// Diagnostics for one failed fetch attempt. Appended per attempt, never
/// replaced, so a retried URL keeps its full failure history.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// First bytes of the response body, lossily decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_excerpt: Option<String>,
    /// Transport-level error text when no response was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The record produced for every URL visited during a crawl.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResult {
    /// Absolute URL after rewrite rules were applied.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub state: LinkState,
    /// URL of the document that referenced this link; empty for seeds.
    pub parent: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_details: Vec<FailureDetail>,
}

impl LinkResult {
    pub fn is_broken(&self) -> bool {
        self.state == LinkState::Broken
    }
}

/// Aggregate returned by `check`.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub passed: bool,
    pub links: Vec<LinkResult>,
}

impl CrawlResult {
    /// `passed` is purely a function of the final link vector.
    pub fn from_links(links: Vec<LinkResult>) -> Self {
        let passed = !links.iter().any(LinkResult::is_broken);
        Self { passed, links }
    }
}

/// Payload of a `retry` event, emitted whenever a URL is (re-)scheduled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryInfo {
    pub url: String,
    pub seconds_until_retry: f64,
    /// Status of the response that triggered the retry; absent for
    /// transport errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, state: LinkState) -> LinkResult {
        LinkResult {
            url: url.to_string(),
            status: Some(200),
            state,
            parent: String::new(),
            failure_details: Vec::new(),
        }
    }

    #[test]
    fn passed_reflects_broken_links() {
        let ok = CrawlResult::from_links(vec![
            link("http://a/", LinkState::Ok),
            link("http://b/", LinkState::Skipped),
        ]);
        assert!(ok.passed);

        let failed = CrawlResult::from_links(vec![
            link("http://a/", LinkState::Ok),
            link("http://b/", LinkState::Broken),
        ]);
        assert!(!failed.passed);
    }

    #[test]
    fn failure_details_serialize_compactly() {
        let detail = FailureDetail {
            status: Some(500),
            ..FailureDetail::default()
        };
        let json = serde_json::to_string(&detail).unwrap();
        assert_eq!(json, r#"{"status":500}"#);
    }
}
