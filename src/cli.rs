use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(
    name = "linkrot",
    version,
    about = "Find broken hyperlinks in websites, local directories, and Markdown trees"
)]
pub struct Cli {
    /// URLs or local paths to scan
    #[arg(required = true, value_name = "LOCATION")]
    pub location: Vec<String>,

    /// Maximum number of in-flight checks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Path to the config file (defaults to linkrot.config.json)
    #[arg(long)]
    pub config: Option<String>,

    /// Serve generated index pages for directories
    #[arg(long)]
    pub directory_listing: bool,

    /// Output format
    #[arg(long, value_enum, ignore_case = true)]
    pub format: Option<Format>,

    /// Treat Markdown files as crawlable documents
    #[arg(long)]
    pub markdown: bool,

    /// Follow links on the same root domain as a seed
    #[arg(short, long)]
    pub recurse: bool,

    /// Retry 429 responses that carry a retry-after header
    #[arg(long)]
    pub retry: bool,

    /// Retry 429 responses without a retry-after header
    #[arg(long)]
    pub retry_no_header: bool,

    /// Attempt bound for no-header retries; -1 retries forever
    #[arg(long, allow_hyphen_values = true)]
    pub retry_no_header_count: Option<i64>,

    /// Fixed delay between no-header retries, in milliseconds
    #[arg(long)]
    pub retry_no_header_delay: Option<u64>,

    /// Retry 5xx responses and network errors with exponential backoff
    #[arg(long)]
    pub retry_errors: bool,

    /// Attempt bound for error retries
    #[arg(long)]
    pub retry_errors_count: Option<u32>,

    /// Jitter added to the error backoff, in milliseconds
    #[arg(long)]
    pub retry_errors_jitter: Option<u64>,

    /// Filesystem root for the static server
    #[arg(long)]
    pub server_root: Option<PathBuf>,

    /// Only report failures (same as --verbosity error)
    #[arg(long, conflicts_with = "verbosity")]
    pub silent: bool,

    /// Regexes of URLs to skip; repeatable, comma/whitespace separated
    #[arg(short, long)]
    pub skip: Vec<String>,

    /// Per-request timeout in milliseconds; 0 disables it
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Pattern half of a URL rewrite rule
    #[arg(long, requires = "url_rewrite_replace")]
    pub url_rewrite_search: Option<String>,

    /// Replacement half of a URL rewrite rule
    #[arg(long, requires = "url_rewrite_search")]
    pub url_rewrite_replace: Option<String>,

    /// Request User-Agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Log verbosity
    #[arg(long, value_enum, ignore_case = true)]
    pub verbosity: Option<Verbosity>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    Debug,
    Info,
    Warning,
    Error,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn location_is_required() {
        assert!(Cli::try_parse_from(["linkrot"]).is_err());
        assert!(Cli::try_parse_from(["linkrot", "http://example.com"]).is_ok());
    }

    #[test]
    fn silent_conflicts_with_verbosity() {
        let result = Cli::try_parse_from([
            "linkrot",
            "http://example.com",
            "--silent",
            "--verbosity",
            "debug",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rewrite_halves_require_each_other() {
        assert!(Cli::try_parse_from([
            "linkrot",
            "http://example.com",
            "--url-rewrite-search",
            "^http://legacy/"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "linkrot",
            "http://example.com",
            "--url-rewrite-search",
            "^http://legacy/",
            "--url-rewrite-replace",
            "http://new/"
        ])
        .is_ok());
    }

    #[test]
    fn negative_no_header_count_parses() {
        let cli = Cli::try_parse_from([
            "linkrot",
            "http://example.com",
            "--retry-no-header-count",
            "-1",
        ])
        .unwrap();
        assert_eq!(cli.retry_no_header_count, Some(-1));
    }
}
