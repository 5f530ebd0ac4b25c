use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use linkrot_core::rewrite::apply_rewrites;
use linkrot_core::urls::{classify_scheme, normalize, origin_key, resolve, SchemeClass};
use linkrot_core::{
    CheckError, CheckOptions, CrawlResult, FailureDetail, LinkResult, LinkState, RetryInfo,
    SkipMatcher,
};
use linkrot_fetch::file::check_file_url;
use linkrot_fetch::{build_client, ClientConfig, FetchError, FetchMode, FetchedDoc, Fetcher};
use linkrot_server::StaticServer;

use crate::bus::EventBus;
use crate::retry::RetryQueue;

/// Per-URL unit of work. Carries its own retry counters and failure
/// history across attempts.
struct CheckTask {
    url: Url,
    parent: String,
    extract: bool,
    error_attempts: u32,
    no_header_attempts: i64,
    failures: Vec<FailureDetail>,
}

struct AttemptReport {
    task: CheckTask,
    outcome: Result<FetchedDoc, FetchError>,
}

/// Broken-link checker engine. Register listeners, then run `check`.
///
/// ```no_run
/// # async fn demo() -> Result<(), linkrot_core::CheckError> {
/// use linkrot_core::CheckOptions;
/// use linkrot_engine::LinkChecker;
///
/// let mut checker = LinkChecker::new();
/// checker.on_link(|link| println!("{:?} {}", link.state, link.url));
/// let result = checker
///     .check(CheckOptions::with_paths(["https://example.com"]))
///     .await?;
/// assert!(result.passed);
/// # Ok(())
/// # }
/// ```
pub struct LinkChecker {
    bus: EventBus,
    cancel: watch::Sender<bool>,
}

impl Default for LinkChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkChecker {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            bus: EventBus::default(),
            cancel,
        }
    }

    /// Register a `link` listener. Listeners must be registered before
    /// `check` is called.
    pub fn on_link(
        &mut self,
        listener: impl Fn(&LinkResult) + Send + Sync + 'static,
    ) -> &mut Self {
        self.bus.on_link(listener);
        self
    }

    /// Register a `retry` listener.
    pub fn on_retry(
        &mut self,
        listener: impl Fn(&RetryInfo) + Send + Sync + 'static,
    ) -> &mut Self {
        self.bus.on_retry(listener);
        self
    }

    /// Abort an in-progress crawl: in-flight fetches stop promptly, the
    /// retry queue is cleared, and only finalized links are reported.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn check(&self, options: CheckOptions) -> Result<CrawlResult, CheckError> {
        options.validate()?;
        let skip = SkipMatcher::compile(&options.links_to_skip)?;
        Crawl::run(&self.bus, self.cancel.subscribe(), options, skip).await
    }
}

/// Single-shot helper equivalent to constructing a checker and awaiting
/// `check`.
pub async fn check(options: CheckOptions) -> Result<CrawlResult, CheckError> {
    LinkChecker::new().check(options).await
}

/// Per-invocation crawl state. Queues, cache, and results are owned here
/// and touched only by the coordinator loop; workers just fetch.
struct Crawl<'a> {
    bus: &'a EventBus,
    options: CheckOptions,
    skip: SkipMatcher,
    fetcher: Arc<Fetcher>,
    seed_origins: HashSet<String>,
    /// Canonical root of the static server, used to scope `file://`
    /// links when one is active.
    served_root: Option<PathBuf>,
    seen: HashSet<String>,
    pending: VecDeque<CheckTask>,
    retries: RetryQueue<CheckTask>,
    results: Vec<LinkResult>,
}

impl<'a> Crawl<'a> {
    async fn run(
        bus: &'a EventBus,
        mut cancel_rx: watch::Receiver<bool>,
        options: CheckOptions,
        skip: SkipMatcher,
    ) -> Result<CrawlResult, CheckError> {
        // Split seeds into ready URLs and local filesystem paths. A
        // `file://` seed is just another spelling of a local path: both
        // go through the static server so their contents get extracted.
        let mut seed_urls: Vec<Url> = Vec::new();
        let mut local_seeds: Vec<PathBuf> = Vec::new();
        for raw in &options.path {
            match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    seed_urls.push(url);
                }
                Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                    Ok(path) => local_seeds.push(path),
                    Err(()) => return Err(CheckError::InvalidSeed(raw.clone())),
                },
                _ => local_seeds.push(PathBuf::from(raw)),
            }
        }

        // Local paths are crawled over HTTP: bring up the ephemeral
        // server and rewrite each path seed onto its origin.
        let mut server = None;
        let mut served_root = None;
        if !local_seeds.is_empty() {
            for path in &local_seeds {
                if !path.exists() {
                    return Err(CheckError::SeedNotFound(path.display().to_string()));
                }
            }
            let root = match &options.server_root {
                Some(root) => root.clone(),
                None => {
                    let first = &local_seeds[0];
                    if first.is_file() {
                        first.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
                    } else {
                        first.clone()
                    }
                }
            };
            let started = StaticServer::start(&root, options.directory_listing)
                .await
                .map_err(|e| CheckError::Server(e.to_string()))?;
            let origin = Url::parse(started.origin())
                .map_err(|e| CheckError::Server(e.to_string()))?;
            let canonical_root = started.root().to_path_buf();
            for path in &local_seeds {
                let canonical = path
                    .canonicalize()
                    .map_err(|_| CheckError::SeedNotFound(path.display().to_string()))?;
                let relative = canonical.strip_prefix(&canonical_root).map_err(|_| {
                    CheckError::InvalidOptions(format!(
                        "seed {} is outside the server root {}",
                        path.display(),
                        canonical_root.display()
                    ))
                })?;
                let mut target = relative.to_string_lossy().replace('\\', "/");
                if canonical.is_dir() && !target.is_empty() && !target.ends_with('/') {
                    target.push('/');
                }
                let seed = origin
                    .join(&target)
                    .map_err(|_| CheckError::InvalidSeed(path.display().to_string()))?;
                seed_urls.push(seed);
            }
            info!(origin = %origin, root = %canonical_root.display(), "serving local seeds");
            served_root = Some(canonical_root);
            server = Some(started);
        }

        let client = build_client(&ClientConfig {
            user_agent: options.user_agent.clone(),
            extra_headers: options.extra_headers.clone(),
        })
        .map_err(|e| CheckError::Client(e.to_string()))?;
        let timeout = (options.timeout_ms > 0).then(|| Duration::from_millis(options.timeout_ms));
        let fetcher = Arc::new(Fetcher::new(client, timeout));

        // Scope for recursion: the origins of every seed, after rewrites.
        let mut seed_origins = HashSet::new();
        for seed in &seed_urls {
            let rewritten = apply_rewrites(seed.as_str(), &options.url_rewrites);
            if let Ok(url) = Url::parse(&rewritten) {
                if let Some(origin) = origin_key(&url) {
                    seed_origins.insert(origin);
                }
            }
        }

        let concurrency = options.concurrency;
        let markdown = options.markdown;
        let directory_listing = options.directory_listing;

        let mut crawl = Crawl {
            bus,
            options,
            skip,
            fetcher,
            seed_origins,
            served_root,
            seen: HashSet::new(),
            pending: VecDeque::new(),
            retries: RetryQueue::new(),
            results: Vec::new(),
        };

        for seed in &seed_urls {
            crawl.discover(seed.as_str(), None, "", true).await;
        }

        let (report_tx, mut report_rx) = mpsc::channel::<AttemptReport>(concurrency.max(16));
        let mut in_flight = 0usize;

        loop {
            while in_flight < concurrency {
                let Some(task) = crawl.pending.pop_front() else {
                    break;
                };
                let fetcher = Arc::clone(&crawl.fetcher);
                let tx = report_tx.clone();
                let mut shutdown = cancel_rx.clone();
                in_flight += 1;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        report = run_attempt(fetcher, task, markdown, directory_listing) => {
                            let _ = tx.send(report).await;
                        }
                    }
                });
            }

            if in_flight == 0 && crawl.pending.is_empty() && crawl.retries.is_empty() {
                break;
            }

            let have_retries = !crawl.retries.is_empty();
            let next_due = crawl.retries.next_due().unwrap_or_else(Instant::now);
            tokio::select! {
                _ = cancel_rx.changed() => {
                    info!("crawl cancelled, dropping unfinished work");
                    crawl.retries.clear();
                    break;
                }
                Some(report) = report_rx.recv() => {
                    in_flight -= 1;
                    crawl.handle_report(report).await;
                }
                _ = tokio::time::sleep_until(next_due), if have_retries => {
                    for task in crawl.retries.pop_due(Instant::now()) {
                        crawl.pending.push_back(task);
                    }
                }
            }
        }

        if let Some(server) = server {
            server.shutdown().await;
        }

        Ok(CrawlResult::from_links(crawl.results))
    }

    /// Funnel every raw URL string (seed or discovered link) through
    /// rewrite, resolution, dedupe, scheme and skip classification, and
    /// finally onto the work queue.
    async fn discover(&mut self, raw: &str, base: Option<&Url>, parent: &str, is_seed: bool) {
        let rewritten = apply_rewrites(raw, &self.options.url_rewrites);
        let resolved = match resolve(&rewritten, base) {
            Ok(url) => url,
            Err(e) => {
                if !self.seen.insert(rewritten.clone()) {
                    return;
                }
                debug!(raw, "unresolvable link: {e}");
                self.finalize(LinkResult {
                    url: rewritten,
                    status: None,
                    state: LinkState::Broken,
                    parent: parent.to_string(),
                    failure_details: vec![FailureDetail {
                        error: Some(format!("invalid URL: {e}")),
                        ..FailureDetail::default()
                    }],
                });
                return;
            }
        };

        let normalized = normalize(&resolved);
        if !self.seen.insert(normalized.as_str().to_string()) {
            // Already enqueued or finalized; the first parent wins.
            return;
        }

        match classify_scheme(&normalized) {
            SchemeClass::Unsupported => {
                debug!(url = %normalized, "unsupported scheme, skipping");
                self.finalize_skipped(normalized, parent);
            }
            SchemeClass::File => {
                if self.skip.is_skipped(normalized.as_str()).await {
                    self.finalize_skipped(normalized, parent);
                    return;
                }
                // With a static server active, file links that escape the
                // served root are out of scope.
                if let Some(root) = &self.served_root {
                    let in_root = normalized
                        .to_file_path()
                        .map(|p| p.starts_with(root))
                        .unwrap_or(false);
                    if !in_root {
                        self.finalize_skipped(normalized, parent);
                        return;
                    }
                }
                self.enqueue(normalized, parent, false);
            }
            SchemeClass::Fetchable => {
                if self.skip.is_skipped(normalized.as_str()).await {
                    self.finalize_skipped(normalized, parent);
                    return;
                }
                let extract = is_seed
                    || (self.options.recurse
                        && origin_key(&normalized)
                            .map(|origin| self.seed_origins.contains(&origin))
                            .unwrap_or(false));
                self.enqueue(normalized, parent, extract);
            }
        }
    }

    fn enqueue(&mut self, url: Url, parent: &str, extract: bool) {
        self.pending.push_back(CheckTask {
            url,
            parent: parent.to_string(),
            extract,
            error_attempts: 0,
            no_header_attempts: 0,
            failures: Vec::new(),
        });
    }

    async fn handle_report(&mut self, report: AttemptReport) {
        let AttemptReport { mut task, outcome } = report;
        match outcome {
            Ok(doc) => {
                let status = doc.status;
                if status == 429 {
                    task.failures.push(failure_from_doc(&doc));
                    if self.options.retry {
                        if let Some(seconds) = doc.retry_after {
                            let seconds = seconds.max(1);
                            self.schedule_retry(task, Duration::from_secs(seconds), Some(status));
                            return;
                        }
                    }
                    // The fixed-delay policy only covers responses with no
                    // usable retry-after header.
                    if self.options.retry_no_header
                        && doc.retry_after.is_none()
                        && (self.options.retry_no_header_count < 0
                            || task.no_header_attempts < self.options.retry_no_header_count)
                    {
                        task.no_header_attempts += 1;
                        let delay = Duration::from_millis(self.options.retry_no_header_delay_ms);
                        self.schedule_retry(task, delay, Some(status));
                        return;
                    }
                    self.finalize_task(task, Some(status), LinkState::Broken);
                    return;
                }

                if (500..=599).contains(&status) {
                    task.failures.push(failure_from_doc(&doc));
                    if self.options.retry_errors
                        && task.error_attempts < self.options.retry_errors_count
                    {
                        task.error_attempts += 1;
                        let delay = self.error_backoff(task.error_attempts);
                        self.schedule_retry(task, delay, Some(status));
                        return;
                    }
                    self.finalize_task(task, Some(status), LinkState::Broken);
                    return;
                }

                if status >= 400 {
                    task.failures.push(failure_from_doc(&doc));
                    self.finalize_task(task, Some(status), LinkState::Broken);
                    return;
                }

                // 2xx/3xx: the link is good. Recurse into whatever the
                // extractor produced, in document order.
                let parent_url = task.url.clone();
                let extraction = doc.extraction;
                self.finalize_task(task, Some(status), LinkState::Ok);
                if let Some(extraction) = extraction {
                    let base = extraction
                        .base
                        .as_deref()
                        .and_then(|href| parent_url.join(href).ok())
                        .unwrap_or_else(|| parent_url.clone());
                    let parent = parent_url.to_string();
                    debug!(parent = %parent, count = extraction.links.len(), "links discovered");
                    for raw in &extraction.links {
                        self.discover(raw, Some(&base), &parent, false).await;
                    }
                }
            }
            Err(err) => {
                task.failures.push(FailureDetail {
                    error: Some(err.to_string()),
                    ..FailureDetail::default()
                });
                if self.options.retry_errors && task.error_attempts < self.options.retry_errors_count
                {
                    task.error_attempts += 1;
                    let delay = self.error_backoff(task.error_attempts);
                    self.schedule_retry(task, delay, None);
                    return;
                }
                warn!(url = %task.url, "fetch failed permanently: {err}");
                self.finalize_task(task, None, LinkState::Broken);
            }
        }
    }

    /// Exponential backoff: 2^attempt seconds plus uniform jitter in
    /// [0, retryErrorsJitter) milliseconds.
    fn error_backoff(&self, attempt: u32) -> Duration {
        let base_ms = 1000u64.saturating_mul(1u64 << attempt.min(20));
        let jitter_ms = if self.options.retry_errors_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.options.retry_errors_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base_ms + jitter_ms)
    }

    fn schedule_retry(&mut self, task: CheckTask, delay: Duration, status: Option<u16>) {
        let info = RetryInfo {
            url: task.url.to_string(),
            seconds_until_retry: delay.as_secs_f64(),
            status,
        };
        debug!(url = %info.url, seconds = info.seconds_until_retry, "retry scheduled");
        self.bus.emit_retry(&info);
        let key = task.url.as_str().to_string();
        self.retries.schedule(key, task, Instant::now() + delay);
    }

    fn finalize_skipped(&mut self, url: Url, parent: &str) {
        self.finalize(LinkResult {
            url: url.to_string(),
            status: None,
            state: LinkState::Skipped,
            parent: parent.to_string(),
            failure_details: Vec::new(),
        });
    }

    fn finalize_task(&mut self, task: CheckTask, status: Option<u16>, state: LinkState) {
        self.finalize(LinkResult {
            url: task.url.to_string(),
            status,
            state,
            parent: task.parent,
            failure_details: task.failures,
        });
    }

    fn finalize(&mut self, result: LinkResult) {
        self.bus.emit_link(&result);
        self.results.push(result);
    }
}

fn failure_from_doc(doc: &FetchedDoc) -> FailureDetail {
    FailureDetail {
        status: Some(doc.status),
        headers: doc.headers.clone(),
        body_excerpt: doc.body_excerpt.clone(),
        error: None,
    }
}

async fn run_attempt(
    fetcher: Arc<Fetcher>,
    task: CheckTask,
    markdown: bool,
    directory_listing: bool,
) -> AttemptReport {
    let outcome = if task.url.scheme() == "file" {
        Ok(check_file_url(&task.url, directory_listing).await)
    } else {
        let mode = if task.extract {
            FetchMode::Extract { markdown }
        } else {
            FetchMode::Probe
        };
        fetcher.fetch(&task.url, mode).await
    };
    AttemptReport { task, outcome }
}
