use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::error::CheckError;

pub type SkipFuture = Pin<Box<dyn Future<Output = Result<bool, anyhow::Error>> + Send>>;

/// User-supplied asynchronous skip predicate.
pub type SkipPredicate = Arc<dyn Fn(&str) -> SkipFuture + Send + Sync>;

/// The `linksToSkip` option: either a list of regex sources or a predicate.
#[derive(Clone, Default)]
pub enum LinksToSkip {
    #[default]
    None,
    Patterns(Vec<String>),
    Predicate(SkipPredicate),
}

impl fmt::Debug for LinksToSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinksToSkip::None => f.write_str("None"),
            LinksToSkip::Patterns(p) => f.debug_tuple("Patterns").field(p).finish(),
            LinksToSkip::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Compiled form of [`LinksToSkip`]. Pattern matching is unanchored and
/// short-circuits on the first hit.
#[derive(Clone)]
pub struct SkipMatcher {
    patterns: Vec<Regex>,
    predicate: Option<SkipPredicate>,
}

impl SkipMatcher {
    /// Compile the skip configuration. An invalid regex is an options
    /// error and fails the whole check before any work starts.
    pub fn compile(links_to_skip: &LinksToSkip) -> Result<Self, CheckError> {
        match links_to_skip {
            LinksToSkip::None => Ok(Self {
                patterns: Vec::new(),
                predicate: None,
            }),
            LinksToSkip::Patterns(sources) => {
                let mut patterns = Vec::with_capacity(sources.len());
                for source in sources {
                    let re = Regex::new(source).map_err(|e| CheckError::InvalidSkipPattern {
                        pattern: source.clone(),
                        message: e.to_string(),
                    })?;
                    patterns.push(re);
                }
                Ok(Self {
                    patterns,
                    predicate: None,
                })
            }
            LinksToSkip::Predicate(p) => Ok(Self {
                patterns: Vec::new(),
                predicate: Some(Arc::clone(p)),
            }),
        }
    }

    /// Whether the URL should be skipped. A failing predicate skips the
    /// link rather than breaking it.
    pub async fn is_skipped(&self, url: &str) -> bool {
        if let Some(predicate) = &self.predicate {
            return match predicate(url).await {
                Ok(skip) => skip,
                Err(e) => {
                    warn!(url, "skip predicate failed, marking skipped: {e}");
                    true
                }
            };
        }
        self.patterns.iter().any(|re| re.is_match(url))
    }
}
