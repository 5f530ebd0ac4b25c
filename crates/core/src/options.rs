use std::path::PathBuf;

use crate::error::CheckError;
use crate::rewrite::UrlRewriteRule;
use crate::skip::LinksToSkip;

pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_RETRY_NO_HEADER_COUNT: i64 = 1;
pub const DEFAULT_RETRY_NO_HEADER_DELAY_MS: u64 = 60_000;
pub const DEFAULT_RETRY_ERRORS_COUNT: u32 = 5;
pub const DEFAULT_RETRY_ERRORS_JITTER_MS: u64 = 3_000;

/// Validated configuration consumed by the engine. Callers (the CLI, the
/// config file loader) are responsible for producing one of these; the
/// engine re-validates before any work starts.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Seed URLs or local filesystem paths. Must be non-empty.
    pub path: Vec<String>,
    /// Maximum in-flight checks.
    pub concurrency: usize,
    /// Per-request deadline in milliseconds; 0 disables the deadline.
    pub timeout_ms: u64,
    /// Follow links on the same root origin as a seed.
    pub recurse: bool,
    /// Treat Markdown documents as extractable inputs.
    pub markdown: bool,
    /// Serve generated index pages for directories.
    pub directory_listing: bool,
    /// Filesystem root for the static server; defaults to the first local
    /// seed path.
    pub server_root: Option<PathBuf>,
    pub links_to_skip: LinksToSkip,
    /// Retry 429 responses that carry a numeric `retry-after` header.
    pub retry: bool,
    /// Retry 429 responses without a usable `retry-after` header.
    pub retry_no_header: bool,
    /// Attempt bound for no-header 429 retries; -1 means unbounded.
    pub retry_no_header_count: i64,
    /// Fixed delay for no-header 429 retries, in milliseconds.
    pub retry_no_header_delay_ms: u64,
    /// Retry 5xx responses and transport errors.
    pub retry_errors: bool,
    pub retry_errors_count: u32,
    /// Upper bound (exclusive) of the uniform jitter added to the
    /// exponential error backoff, in milliseconds.
    pub retry_errors_jitter_ms: u64,
    /// Headers added to every outbound request.
    pub extra_headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub url_rewrites: Vec<UrlRewriteRule>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            path: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_ms: 0,
            recurse: false,
            markdown: false,
            directory_listing: false,
            server_root: None,
            links_to_skip: LinksToSkip::None,
            retry: false,
            retry_no_header: false,
            retry_no_header_count: DEFAULT_RETRY_NO_HEADER_COUNT,
            retry_no_header_delay_ms: DEFAULT_RETRY_NO_HEADER_DELAY_MS,
            retry_errors: false,
            retry_errors_count: DEFAULT_RETRY_ERRORS_COUNT,
            retry_errors_jitter_ms: DEFAULT_RETRY_ERRORS_JITTER_MS,
            extra_headers: Vec::new(),
            user_agent: None,
            url_rewrites: Vec::new(),
        }
    }
}

impl CheckOptions {
    /// Seed-only convenience constructor.
    pub fn with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CheckError> {
        if self.path.is_empty() {
            return Err(CheckError::InvalidOptions(
                "at least one path is required".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(CheckError::InvalidOptions(
                "concurrency must be a positive integer".into(),
            ));
        }
        if self.retry_no_header_count < -1 {
            return Err(CheckError::InvalidOptions(
                "retry-no-header-count must be -1 or a non-negative integer".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = CheckOptions::with_paths(["http://example.com"]);
        assert!(opts.validate().is_ok());
        assert_eq!(opts.concurrency, 100);
        assert_eq!(opts.timeout_ms, 0);
        assert!(!opts.recurse);
    }

    #[test]
    fn empty_path_is_rejected() {
        let opts = CheckOptions::default();
        assert!(matches!(
            opts.validate(),
            Err(CheckError::InvalidOptions(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let opts = CheckOptions {
            concurrency: 0,
            ..CheckOptions::with_paths(["http://example.com"])
        };
        assert!(opts.validate().is_err());
    }
}
