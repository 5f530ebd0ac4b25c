pub mod error;
pub mod options;
pub mod rewrite;
pub mod skip;
pub mod types;
pub mod urls;

pub use error::CheckError;
pub use options::CheckOptions;
pub use rewrite::UrlRewriteRule;
pub use skip::{LinksToSkip, SkipMatcher, SkipPredicate};
pub use types::*;
