use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

use linkrot_core::{CheckOptions, LinksToSkip, UrlRewriteRule};

use crate::cli::{Cli, Format, Verbosity};

pub const DEFAULT_CONFIG_PATH: &str = "linkrot.config.json";

/// On-disk configuration. Keys mirror the CLI long-form names; camelCase
/// spellings are accepted as aliases. CLI flags override file values.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency: Option<usize>,
    #[serde(alias = "directoryListing")]
    pub directory_listing: Option<bool>,
    pub format: Option<String>,
    pub markdown: Option<bool>,
    pub recurse: Option<bool>,
    pub retry: Option<bool>,
    #[serde(alias = "retryNoHeader")]
    pub retry_no_header: Option<bool>,
    #[serde(alias = "retryNoHeaderCount")]
    pub retry_no_header_count: Option<i64>,
    #[serde(alias = "retryNoHeaderDelay")]
    pub retry_no_header_delay: Option<u64>,
    #[serde(alias = "retryErrors")]
    pub retry_errors: Option<bool>,
    #[serde(alias = "retryErrorsCount")]
    pub retry_errors_count: Option<u32>,
    #[serde(alias = "retryErrorsJitter")]
    pub retry_errors_jitter: Option<u64>,
    #[serde(alias = "serverRoot")]
    pub server_root: Option<PathBuf>,
    pub silent: Option<bool>,
    pub skip: Option<Vec<String>>,
    pub timeout: Option<u64>,
    #[serde(alias = "urlRewriteSearch")]
    pub url_rewrite_search: Option<String>,
    #[serde(alias = "urlRewriteReplace")]
    pub url_rewrite_replace: Option<String>,
    #[serde(alias = "userAgent")]
    pub user_agent: Option<String>,
    pub verbosity: Option<String>,
}

/// Load the config file. A missing file is only an error when the user
/// pointed at it explicitly.
pub fn load(path: &str, explicit: bool) -> Result<FileConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            serde_json::from_str(&content).with_context(|| format!("invalid config file {path}"))
        }
        Err(_) if !explicit => Ok(FileConfig::default()),
        Err(e) => bail!("cannot read config file {path}: {e}"),
    }
}

pub fn effective_verbosity(cli: &Cli, file: &FileConfig) -> Result<Verbosity> {
    if cli.silent {
        return Ok(Verbosity::Error);
    }
    if let Some(v) = cli.verbosity {
        return Ok(v);
    }
    if file.silent == Some(true) {
        return Ok(Verbosity::Error);
    }
    match file.verbosity.as_deref() {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "debug" => Ok(Verbosity::Debug),
            "info" => Ok(Verbosity::Info),
            "warning" => Ok(Verbosity::Warning),
            "error" => Ok(Verbosity::Error),
            "none" => Ok(Verbosity::None),
            other => bail!("invalid verbosity {other:?} in config file"),
        },
        None => Ok(Verbosity::Info),
    }
}

pub fn effective_format(cli: &Cli, file: &FileConfig) -> Result<Format> {
    if let Some(format) = cli.format {
        return Ok(format);
    }
    match file.format.as_deref() {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            other => bail!("invalid format {other:?} in config file"),
        },
        None => Ok(Format::Text),
    }
}

/// `--skip` values are repeatable and each may hold several patterns
/// separated by commas or whitespace.
fn split_skip_patterns(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split([',', ' ', '\t']))
        .filter(|pattern| !pattern.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn build_options(cli: &Cli, file: &FileConfig) -> Result<CheckOptions> {
    let mut options = CheckOptions::with_paths(cli.location.clone());

    if let Some(v) = cli.concurrency.or(file.concurrency) {
        options.concurrency = v;
    }
    if let Some(v) = cli.timeout.or(file.timeout) {
        options.timeout_ms = v;
    }
    options.recurse = cli.recurse || file.recurse.unwrap_or(false);
    options.markdown = cli.markdown || file.markdown.unwrap_or(false);
    options.directory_listing = cli.directory_listing || file.directory_listing.unwrap_or(false);
    options.server_root = cli.server_root.clone().or_else(|| file.server_root.clone());
    options.retry = cli.retry || file.retry.unwrap_or(false);
    options.retry_no_header = cli.retry_no_header || file.retry_no_header.unwrap_or(false);
    if let Some(v) = cli.retry_no_header_count.or(file.retry_no_header_count) {
        options.retry_no_header_count = v;
    }
    if let Some(v) = cli.retry_no_header_delay.or(file.retry_no_header_delay) {
        options.retry_no_header_delay_ms = v;
    }
    options.retry_errors = cli.retry_errors || file.retry_errors.unwrap_or(false);
    if let Some(v) = cli.retry_errors_count.or(file.retry_errors_count) {
        options.retry_errors_count = v;
    }
    if let Some(v) = cli.retry_errors_jitter.or(file.retry_errors_jitter) {
        options.retry_errors_jitter_ms = v;
    }
    options.user_agent = cli.user_agent.clone().or_else(|| file.user_agent.clone());

    let skip_patterns = if cli.skip.is_empty() {
        file.skip.clone().unwrap_or_default()
    } else {
        split_skip_patterns(&cli.skip)
    };
    if !skip_patterns.is_empty() {
        options.links_to_skip = LinksToSkip::Patterns(skip_patterns);
    }

    let search = cli
        .url_rewrite_search
        .clone()
        .or_else(|| file.url_rewrite_search.clone());
    let replace = cli
        .url_rewrite_replace
        .clone()
        .or_else(|| file.url_rewrite_replace.clone());
    match (search, replace) {
        (Some(search), Some(replace)) => {
            let pattern = Regex::new(&search)
                .with_context(|| format!("invalid url rewrite pattern {search:?}"))?;
            options.url_rewrites.push(UrlRewriteRule::new(pattern, replace));
        }
        (None, None) => {}
        _ => bail!("url-rewrite-search and url-rewrite-replace require each other"),
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["linkrot"];
        argv.extend(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn kebab_and_camel_case_keys_both_parse() {
        let kebab: FileConfig =
            serde_json::from_str(r#"{"retry-errors-count": 3, "directory-listing": true}"#)
                .unwrap();
        assert_eq!(kebab.retry_errors_count, Some(3));
        assert_eq!(kebab.directory_listing, Some(true));

        let camel: FileConfig =
            serde_json::from_str(r#"{"retryErrorsCount": 4, "directoryListing": false}"#).unwrap();
        assert_eq!(camel.retry_errors_count, Some(4));
        assert_eq!(camel.directory_listing, Some(false));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let result: Result<FileConfig, _> = serde_json::from_str(r#"{"no-such-option": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let file: FileConfig =
            serde_json::from_str(r#"{"concurrency": 7, "timeout": 500, "recurse": true}"#).unwrap();
        let cli = cli(&["http://example.com", "--concurrency", "3"]);
        let options = build_options(&cli, &file).unwrap();

        assert_eq!(options.concurrency, 3);
        assert_eq!(options.timeout_ms, 500);
        assert!(options.recurse);
    }

    #[test]
    fn skip_values_split_on_commas_and_whitespace() {
        let cli = cli(&["http://example.com", "-s", "foo,bar baz", "-s", "qux"]);
        let options = build_options(&cli, &FileConfig::default()).unwrap();
        match options.links_to_skip {
            LinksToSkip::Patterns(patterns) => {
                assert_eq!(patterns, vec!["foo", "bar", "baz", "qux"]);
            }
            _ => panic!("expected patterns"),
        }
    }

    #[test]
    fn rewrite_halves_from_file_must_pair() {
        let file: FileConfig =
            serde_json::from_str(r#"{"url-rewrite-search": "^http://legacy/"}"#).unwrap();
        let cli = cli(&["http://example.com"]);
        assert!(build_options(&cli, &file).is_err());
    }

    #[test]
    fn silent_maps_to_error_verbosity() {
        let cli = cli(&["http://example.com", "--silent"]);
        let verbosity = effective_verbosity(&cli, &FileConfig::default()).unwrap();
        assert_eq!(verbosity, Verbosity::Error);
    }

    #[test]
    fn missing_default_config_is_fine_but_explicit_is_not() {
        assert!(load("definitely-missing.config.json", false).is_ok());
        assert!(load("definitely-missing.config.json", true).is_err());
    }
}
