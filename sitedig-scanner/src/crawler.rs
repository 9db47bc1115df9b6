use crate::config::SiteConfig;
use crate::error::{Result, ScanError};
use crate::fetch::{Fetch, FetchedResource, HttpFetcher};
use crate::frontier::{Frontier, FrontierEntry};
use crate::page::{Page, PageSummary};
use crate::result::{CrawlResults, RecordOutcome, ResultEntry};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Called with `(worker_id, url)` whenever a worker starts on a URL.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
/// Called with every newly recorded URL and its entry.
pub type ResultCallback = Arc<dyn Fn(&str, &ResultEntry) + Send + Sync>;

/// Drives a fixed pool of workers over a shared frontier until every
/// same-origin resource reachable from the base URL has been processed.
///
/// The configuration is shared read-only; the results store and the
/// frontier are the only state workers mutate.
pub struct Crawler<F: Fetch = HttpFetcher> {
    config: Arc<SiteConfig>,
    fetcher: Arc<F>,
    results: Arc<Mutex<CrawlResults>>,
    active: StdMutex<Option<ActiveCrawl>>,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
}

/// Handles for the crawl currently in progress.
struct ActiveCrawl {
    workers: Vec<(usize, JoinHandle<()>)>,
    cancel: watch::Sender<bool>,
    // Closes when the running `crawl` call returns or is dropped.
    finished: watch::Receiver<()>,
}

/// Clears the active crawl on every exit path of `crawl`, aborting any
/// worker still attached to it.
struct ActiveGuard<'a> {
    active: &'a StdMutex<Option<ActiveCrawl>>,
    _finished: watch::Sender<()>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            for (_, handle) in active.workers {
                handle.abort();
            }
        }
    }
}

impl Crawler<HttpFetcher> {
    pub fn new(config: SiteConfig) -> Result<Self> {
        let config = Arc::new(config);
        let fetcher = HttpFetcher::new(config.clone())?;
        Ok(Self::with_fetcher(config, fetcher))
    }
}

impl<F: Fetch> Crawler<F> {
    pub fn with_fetcher(config: impl Into<Arc<SiteConfig>>, fetcher: F) -> Self {
        Self {
            config: config.into(),
            fetcher: Arc::new(fetcher),
            results: Arc::new(Mutex::new(CrawlResults::new())),
            active: StdMutex::new(None),
            progress_callback: None,
            result_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveCrawl>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach_workers(&self, workers: Vec<(usize, JoinHandle<()>)>) {
        if let Some(active) = self.active().as_mut() {
            active.workers = workers;
        }
    }

    fn detach_workers(&self) -> Vec<(usize, JoinHandle<()>)> {
        self.active()
            .as_mut()
            .map(|active| std::mem::take(&mut active.workers))
            .unwrap_or_default()
    }

    /// Crawls from the base URL until the frontier is drained and settled,
    /// or until [`Crawler::stop`] is called. A stopped crawl still returns
    /// everything recorded so far.
    pub async fn crawl(&self) -> Result<CrawlResults> {
        let (cancel, mut cancelled) = watch::channel(false);
        let (finished_tx, finished) = watch::channel(());
        {
            let mut active = self.active();
            if active.is_some() {
                return Err(ScanError::Other("a crawl is already running".to_string()));
            }
            *active = Some(ActiveCrawl {
                workers: Vec::new(),
                cancel,
                finished,
            });
        }
        let _guard = ActiveGuard {
            active: &self.active,
            _finished: finished_tx,
        };

        let base = self.config.base().to_string();
        let worker_count = self.config.workers();
        info!("Starting crawl of {} with {} workers", base, worker_count);

        *self.results.lock().await = CrawlResults::new();

        let frontier = Arc::new(Frontier::new());
        frontier.push(&base, "");

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    config: self.config.clone(),
                    fetcher: self.fetcher.clone(),
                    frontier: frontier.clone(),
                    results: self.results.clone(),
                    progress_callback: self.progress_callback.clone(),
                    result_callback: self.result_callback.clone(),
                };
                (worker_id, tokio::spawn(worker.run()))
            })
            .collect();
        self.attach_workers(workers);

        tokio::select! {
            _ = frontier.join() => debug!("Frontier drained and settled"),
            _ = wait_for_cancel(&mut cancelled) => info!("Crawl of {} cancelled", base),
        }

        let was_cancelled = *cancelled.borrow();
        let handles = self.detach_workers();
        if was_cancelled {
            // Workers spawned after a stop request never saw the abort.
            for (_, handle) in &handles {
                handle.abort();
            }
        }
        join_workers(handles).await;

        let mut results = self.results.lock().await.clone();
        results.mark_cancelled(was_cancelled);
        info!(
            "Crawl complete. Recorded {} resources ({} discovered)",
            results.len(),
            frontier.discovered()
        );
        Ok(results)
    }

    /// Cancels every worker and waits until the running crawl has returned.
    /// Does nothing when no crawl is running. Entries recorded before the
    /// call stay valid.
    pub async fn stop(&self) {
        let mut finished = {
            let active = self.active();
            let Some(active) = active.as_ref() else {
                return;
            };
            active.cancel.send_replace(true);
            for (_, handle) in &active.workers {
                handle.abort();
            }
            active.finished.clone()
        };

        while finished.changed().await.is_ok() {}
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    /// Snapshot of what has been recorded so far.
    pub async fn results(&self) -> CrawlResults {
        self.results.lock().await.clone()
    }

    pub async fn recorded_count(&self) -> usize {
        self.results.lock().await.len()
    }
}

async fn wait_for_cancel(cancelled: &mut watch::Receiver<bool>) {
    loop {
        if *cancelled.borrow_and_update() {
            return;
        }
        if cancelled.changed().await.is_err() {
            return;
        }
    }
}

async fn join_workers(handles: Vec<(usize, JoinHandle<()>)>) {
    for (worker_id, handle) in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("Worker {} cancelled", worker_id),
            Err(e) => error!("Worker {} failed: {}", worker_id, ScanError::from(e)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

struct Worker<F: Fetch> {
    id: usize,
    config: Arc<SiteConfig>,
    fetcher: Arc<F>,
    frontier: Arc<Frontier>,
    results: Arc<Mutex<CrawlResults>>,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
}

impl<F: Fetch> Worker<F> {
    async fn run(self) {
        debug!("Worker {} started", self.id);

        while let Some(entry) = self.frontier.next().await {
            let _settle = self.frontier.settle_on_drop();

            // Checked before processing, not atomically with recording: the
            // final count may overshoot the limit by up to workers - 1.
            if self.config.is_limit_reached(self.results.lock().await.len()) {
                let dropped = self.frontier.drain() + 1;
                debug!(
                    "Worker {}: discovery limit reached, dropped {} queued URLs",
                    self.id, dropped
                );
                break;
            }

            if let Some(ref callback) = self.progress_callback {
                callback(self.id, entry.url.clone());
            }

            let url = entry.url.clone();
            if let Err(panic) = AssertUnwindSafe(self.visit(entry)).catch_unwind().await {
                error!(
                    "Worker {} panicked on {}: {}",
                    self.id,
                    url,
                    panic_message(panic.as_ref())
                );
            }
        }

        debug!("Worker {} finished", self.id);
    }

    async fn visit(&self, entry: FrontierEntry) {
        info!("Processing {}", entry.url);

        let Some(resource) = self.fetcher.fetch(&entry.url).await else {
            return;
        };
        let Some(summary) = self.process(&entry.url, &resource) else {
            return;
        };

        self.record(&entry, &summary, resource).await;
        self.enqueue(&entry.url, &summary.links);
    }

    /// Runs the content processor. Kept synchronous: the parsed page must not
    /// live across an `.await`.
    fn process(&self, url: &str, resource: &FetchedResource) -> Option<PageSummary> {
        let mut page = Page::new(&self.config, &resource.body, &resource.encoding, Some(url));
        page.process()
    }

    async fn record(&self, entry: &FrontierEntry, summary: &PageSummary, resource: FetchedResource) {
        let result = ResultEntry {
            source: entry.referrer.clone(),
            encoding: summary.encoding.clone(),
            checksum: summary.checksum.clone(),
            body: self.config.store_body().then_some(resource.body),
            headers: self.config.store_headers().then_some(resource.headers),
        };

        let mut results = self.results.lock().await;
        match results.record(&entry.url, result, self.config.deduplicate()) {
            RecordOutcome::Recorded => {
                debug!("[Worker {}] Recorded {}", self.id, entry.url);
                if let Some(ref callback) = self.result_callback
                    && let Some(recorded) = results.get(&entry.url)
                {
                    callback(&entry.url, recorded);
                }
            }
            RecordOutcome::KnownUrl => {
                debug!("[Worker {}] {} already recorded", self.id, entry.url);
            }
            RecordOutcome::DuplicateContent { original } => {
                debug!(
                    "[Worker {}] {} has the same content as {}, skipping",
                    self.id, entry.url, original
                );
            }
        }
    }

    fn enqueue(&self, referrer: &str, links: &BTreeSet<String>) {
        for link in links {
            if link == referrer {
                continue;
            }
            if self.frontier.push(link, referrer) {
                debug!("[Worker {}] Added to queue: {}", self.id, link);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    const BASE: &str = "http://site.test/";

    /// In-memory site: URL -> body, served as UTF-8.
    #[derive(Default)]
    struct StaticSite {
        pages: HashMap<String, Vec<u8>>,
        delay: Option<Duration>,
        fetches: Arc<Mutex<Vec<String>>>,
    }

    impl StaticSite {
        fn page(mut self, path: &str, body: &str) -> Self {
            self.pages
                .insert(format!("{}{}", BASE, path), body.as_bytes().to_vec());
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    impl Fetch for StaticSite {
        async fn fetch(&self, url: &str) -> Option<FetchedResource> {
            self.fetches.lock().await.push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.pages.get(url).map(|body| FetchedResource {
                body: body.clone(),
                encoding: "utf-8".to_string(),
                headers: [("content-type".to_string(), "text/html".to_string())]
                    .into_iter()
                    .collect(),
            })
        }
    }

    /// Six reachable resources, one unreachable page and a dead link.
    fn closed_site() -> StaticSite {
        StaticSite::default()
            .page(
                "",
                r#"<a href="pages/about.html">About</a>
                   <a href="pages/contact.html">Contact</a>
                   <script src="js/script.js"></script>
                   <a href="https://elsewhere.test/">External</a>
                   <a href="missing.html">Gone</a>"#,
            )
            .page(
                "pages/about.html",
                r#"<a href="/">Home</a><a href="pages/feedback.html">Feedback</a>"#,
            )
            .page(
                "pages/contact.html",
                r#"<form action="/scripts/feedback.html"></form><a href="pages/about.html#team">Team</a>"#,
            )
            .page("pages/feedback.html", "<p>Thanks</p>")
            .page("js/script.js", "console.log('hi');")
            .page("scripts/feedback.html", "<p>Sent</p>")
            .page("orphan.html", "<p>Nobody links here</p>")
    }

    fn config(workers: usize) -> SiteConfig {
        SiteConfig::builder(BASE)
            .with_workers(workers)
            .build()
            .unwrap()
    }

    fn expected_closed_site_urls() -> Vec<String> {
        [
            "",
            "js/script.js",
            "pages/about.html",
            "pages/contact.html",
            "pages/feedback.html",
            "scripts/feedback.html",
        ]
        .iter()
        .map(|p| format!("{}{}", BASE, p))
        .collect()
    }

    #[tokio::test]
    async fn test_crawl_closed_graph() {
        let crawler = Crawler::with_fetcher(config(4), closed_site());
        let results = crawler.crawl().await.unwrap();

        let urls: Vec<String> = results.urls().map(String::from).collect();
        assert_eq!(urls, expected_closed_site_urls());
        assert!(!results.was_cancelled());

        let seed = results.get(BASE).unwrap();
        assert_eq!(seed.source, "");
        assert_eq!(seed.encoding, "utf-8");
        assert_eq!(seed.checksum.len(), 32);
        assert!(seed.body.is_none());
        assert!(seed.headers.is_none());

        let about = results.get("http://site.test/pages/about.html").unwrap();
        assert_eq!(about.source, BASE);
    }

    #[tokio::test]
    async fn test_same_urls_regardless_of_worker_count() {
        for workers in [1, 4, 16] {
            let crawler = Crawler::with_fetcher(
                config(workers),
                closed_site().with_delay(Duration::from_millis(2)),
            );
            let results = crawler.crawl().await.unwrap();
            let urls: Vec<String> = results.urls().map(String::from).collect();
            assert_eq!(urls, expected_closed_site_urls(), "workers = {}", workers);
        }
    }

    #[tokio::test]
    async fn test_each_url_fetched_once() {
        let site = closed_site();
        let fetches = site.fetches.clone();
        let crawler = Crawler::with_fetcher(config(8), site);
        crawler.crawl().await.unwrap();

        let fetches = fetches.lock().await;
        let unique: BTreeSet<&String> = fetches.iter().collect();
        assert_eq!(unique.len(), fetches.len());
        // Six recorded resources plus the dead link.
        assert_eq!(fetches.len(), 7);
    }

    #[tokio::test]
    async fn test_dedup_keeps_one_of_identical_pages() {
        let body = r#"<a href="index.html">Index</a>"#;
        let site = StaticSite::default()
            .page("", body)
            .page("index.html", body);

        let crawler = Crawler::with_fetcher(config(2), site);
        let results = crawler.crawl().await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results.contains(BASE));
        assert_eq!(
            results.checksum_owner(&results.get(BASE).unwrap().checksum),
            Some(BASE)
        );
    }

    #[tokio::test]
    async fn test_no_dedup_keeps_identical_pages() {
        let body = r#"<a href="index.html">Index</a>"#;
        let site = StaticSite::default()
            .page("", body)
            .page("index.html", body);

        let config = SiteConfig::builder(BASE)
            .with_workers(2)
            .with_deduplicate(false)
            .build()
            .unwrap();
        let results = Crawler::with_fetcher(config, site).crawl().await.unwrap();

        assert_eq!(results.len(), 2);
        let seed = results.get(BASE).unwrap();
        let index = results.get("http://site.test/index.html").unwrap();
        assert_eq!(seed.checksum, index.checksum);
        assert_eq!(results.checksum_owner(&seed.checksum), Some(BASE));
    }

    #[tokio::test]
    async fn test_dedup_invariant_holds() {
        let site = StaticSite::default()
            .page("", r#"<a href="a.html"></a><a href="b.html"></a><a href="c.html"></a>"#)
            .page("a.html", "<p>same</p>")
            .page("b.html", "<p>same</p>")
            .page("c.html", "<p>different</p>");

        let results = Crawler::with_fetcher(config(3), site).crawl().await.unwrap();

        let checksums: Vec<&str> = results.iter().map(|(_, e)| e.checksum.as_str()).collect();
        let unique: BTreeSet<&str> = checksums.iter().copied().collect();
        assert_eq!(checksums.len(), unique.len());
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_self_links_are_not_requeued() {
        let site = StaticSite::default().page("", r#"<a href="/">Home</a><a href="">Me</a>"#);
        let fetches = site.fetches.clone();

        let results = Crawler::with_fetcher(config(2), site).crawl().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(*fetches.lock().await, vec![BASE.to_string()]);
    }

    #[tokio::test]
    async fn test_limit_overshoot_is_bounded() {
        let mut site = StaticSite::default().with_delay(Duration::from_millis(5));
        let mut root = String::new();
        for i in 0..50 {
            root.push_str(&format!(r#"<a href="page{}.html">{}</a>"#, i, i));
            site = site.page(&format!("page{}.html", i), &format!("<p>{}</p>", i));
        }
        site = site.page("", &root);

        let workers = 4;
        let limit = 10;
        let config = SiteConfig::builder(BASE)
            .with_workers(workers)
            .with_limit(limit)
            .build()
            .unwrap();
        let results = Crawler::with_fetcher(config, site).crawl().await.unwrap();

        assert!(results.len() >= limit, "recorded {}", results.len());
        assert!(
            results.len() <= limit + workers - 1,
            "recorded {}",
            results.len()
        );
    }

    #[tokio::test]
    async fn test_store_body_and_headers() {
        let site = StaticSite::default().page("", "<p>body</p>");
        let config = SiteConfig::builder(BASE)
            .with_store_body(true)
            .with_store_headers(true)
            .build()
            .unwrap();

        let results = Crawler::with_fetcher(config, site).crawl().await.unwrap();
        let seed = results.get(BASE).unwrap();

        assert_eq!(seed.body.as_deref(), Some(b"<p>body</p>".as_slice()));
        assert_eq!(
            seed.headers
                .as_ref()
                .and_then(|h| h.get("content-type"))
                .map(String::as_str),
            Some("text/html")
        );
    }

    #[tokio::test]
    async fn test_unreachable_seed_yields_empty_results() {
        let crawler = Crawler::with_fetcher(config(4), StaticSite::default());
        let results = crawler.crawl().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_running_crawl() {
        let mut site = StaticSite::default().with_delay(Duration::from_millis(50));
        let mut root = String::new();
        for i in 0..100 {
            root.push_str(&format!(r#"<a href="p{}.html">{}</a>"#, i, i));
            site = site.page(&format!("p{}.html", i), &format!("<p>{}</p>", i));
        }
        site = site.page("", &root);

        let crawler = Arc::new(Crawler::with_fetcher(config(2), site));
        let running = {
            let crawler = crawler.clone();
            tokio::spawn(async move { crawler.crawl().await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        crawler.stop().await;

        let results = running.await.unwrap().unwrap();
        assert!(results.was_cancelled());
        assert!(results.contains(BASE));
        assert!(results.len() < 101);
        assert_eq!(crawler.recorded_count().await, results.len());
    }

    #[tokio::test]
    async fn test_progress_and_result_callbacks() {
        let visited = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::new(StdMutex::new(Vec::new()));

        let crawler = {
            let visited = visited.clone();
            let recorded = recorded.clone();
            Crawler::with_fetcher(config(4), closed_site())
                .with_progress_callback(Arc::new(move |_worker_id: usize, _url: String| {
                    visited.fetch_add(1, Ordering::SeqCst);
                }))
                .with_result_callback(Arc::new(move |url: &str, _entry: &ResultEntry| {
                    recorded.lock().unwrap().push(url.to_string());
                }))
        };
        let results = crawler.crawl().await.unwrap();

        assert_eq!(visited.load(Ordering::SeqCst), 7);
        let mut recorded = recorded.lock().unwrap().clone();
        recorded.sort();
        assert_eq!(recorded, results.urls().map(String::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_crawl_over_http() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_bytes(
                        r#"<html><body>
                            <a href="page.html">Page</a>
                            <a href="binary.exe">Binary</a>
                            <a href="image.png">Image</a>
                            <a href="missing.html">Missing</a>
                        </body></html>"#
                            .as_bytes(),
                    ),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(
                        br##"<html><head><meta charset="iso-8859-1"></head><body>
                            <script type="text/javascript" src="code.js"></script>
                            <a href="#top">Ignore</a>
                            <a href="page2.html?arg=2">Follow</a>
                            <a href="page2.html' + SOMETHING + '">Ignore</a>
                        </body></html>"##
                            .as_slice(),
                    ),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page2.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(b"<html><body>Test 2!</body></html>".as_slice()),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/code.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/javascript")
                    .set_body_bytes(b"alert(\"Test!\");".as_slice()),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/binary.exe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0x4d, 0x5a, 0x90, 0x00]),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
            )
            .mount(&mock_server)
            .await;

        let config = SiteConfig::builder(mock_server.uri())
            .with_workers(4)
            .with_store_headers(true)
            .build()
            .unwrap();
        let crawler = Crawler::new(config).unwrap();
        let results = crawler.crawl().await.unwrap();

        let base = format!("{}/", mock_server.uri());
        let urls: Vec<String> = results.urls().map(String::from).collect();
        assert_eq!(
            urls,
            vec![
                base.clone(),
                format!("{}code.js", base),
                format!("{}page.html", base),
                format!("{}page2.html?arg=2", base),
            ]
        );

        let page = results.get(&format!("{}page.html", base)).unwrap();
        assert_eq!(page.source, base);
        assert_eq!(page.encoding, "iso-8859-1");

        let script = results.get(&format!("{}code.js", base)).unwrap();
        assert_eq!(script.checksum, "b4577eafb339aab8076a1e069e62d2c5");
        assert_eq!(script.source, format!("{}page.html", base));

        for (_, entry) in results.iter() {
            assert!(entry.headers.is_some());
        }
    }

    #[tokio::test]
    async fn test_crawl_rejects_second_concurrent_run() {
        let site = StaticSite::default()
            .with_delay(Duration::from_millis(100))
            .page("", "<p>slow</p>");
        let crawler = Arc::new(Crawler::with_fetcher(config(1), site));

        let first = {
            let crawler = crawler.clone();
            tokio::spawn(async move { crawler.crawl().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(crawler.crawl().await, Err(ScanError::Other(_))));
        assert_eq!(first.await.unwrap().unwrap().len(), 1);
    }

    /// Panics on one URL, serves the rest from a [`StaticSite`].
    struct FaultySite {
        site: StaticSite,
        poison: String,
    }

    impl Fetch for FaultySite {
        async fn fetch(&self, url: &str) -> Option<FetchedResource> {
            if url == self.poison {
                panic!("fetcher blew up on {}", url);
            }
            self.site.fetch(url).await
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_hang_crawl() {
        let fetcher = FaultySite {
            site: closed_site(),
            poison: "http://site.test/pages/contact.html".to_string(),
        };
        let crawler = Crawler::with_fetcher(config(4), fetcher);

        let results = tokio::time::timeout(Duration::from_secs(5), crawler.crawl())
            .await
            .expect("crawl should finish")
            .unwrap();

        assert!(results.contains(BASE));
        assert!(!results.contains("http://site.test/pages/contact.html"));
        // Only reachable through the contact page.
        assert!(!results.contains("http://site.test/scripts/feedback.html"));
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn test_single_worker_survives_panic_on_queued_url() {
        let fetcher = FaultySite {
            site: closed_site(),
            poison: "http://site.test/pages/about.html".to_string(),
        };
        let crawler = Crawler::with_fetcher(config(1), fetcher);

        let results = tokio::time::timeout(Duration::from_secs(5), crawler.crawl())
            .await
            .expect("crawl should finish")
            .unwrap();

        let mut urls: Vec<String> = results.urls().map(String::from).collect();
        urls.sort();
        let expected: Vec<String> = ["", "js/script.js", "pages/contact.html", "scripts/feedback.html"]
            .iter()
            .map(|p| format!("{}{}", BASE, p))
            .collect();
        assert_eq!(urls, expected);
        assert!(!results.was_cancelled());
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_crawl_is_noop() {
        let crawler = Crawler::with_fetcher(config(2), closed_site());
        crawler.stop().await;
        assert!(!crawler.is_running());

        let results = crawler.crawl().await.unwrap();
        assert!(!results.was_cancelled());
        assert_eq!(results.len(), 6);
    }
}
