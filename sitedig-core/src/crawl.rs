use indicatif::{ProgressBar, ProgressStyle};
use sitedig_scanner::{CrawlResults, Crawler, ResultEntry, SiteConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub site: SiteConfig,
    pub show_progress_bars: bool,
}

/// Callback for human-readable status messages
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Callback for each URL as it is recorded
pub type CrawlResultCallback = Arc<dyn Fn(String, ResultEntry) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Starting crawl...");
    pb
}

/// Execute a crawl with the given options.
///
/// Ctrl-C stops the crawl; whatever was recorded until then is returned
/// and flagged as cancelled.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
    result_callback: Option<CrawlResultCallback>,
) -> Result<CrawlResults, String> {
    let CrawlOptions {
        site,
        show_progress_bars,
    } = options;
    let base = site.base().to_string();

    let progress_bar = show_progress_bars.then(|| Arc::new(spinner()));
    let processed_count = Arc::new(AtomicUsize::new(0));

    let internal_progress_callback: sitedig_scanner::ProgressCallback = {
        let pb = progress_bar.clone();
        let count = processed_count.clone();
        Arc::new(move |worker_id: usize, url: String| {
            let processed = count.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = pb {
                pb.set_message(format!(
                    "Crawling... {} URLs processed (worker {}: {})",
                    processed,
                    worker_id,
                    extract_url_path(&url)
                ));
            }
        })
    };

    let mut crawler = Crawler::new(site)
        .map_err(|e| format!("Failed to create crawler: {}", e))?
        .with_progress_callback(internal_progress_callback);

    if let Some(cb) = result_callback {
        let result_cb: sitedig_scanner::ResultCallback =
            Arc::new(move |url: &str, entry: &ResultEntry| cb(url.to_string(), entry.clone()));
        crawler = crawler.with_result_callback(result_cb);
    }

    if let Some(ref callback) = progress_callback {
        callback(format!("Crawling {}", base));
    }

    let crawl = crawler.crawl();
    tokio::pin!(crawl);
    let outcome = tokio::select! {
        outcome = &mut crawl => outcome,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping crawl of {}", base);
            if let Some(ref pb) = progress_bar {
                pb.set_message("Interrupted, stopping workers...");
            }
            // stop() returns once crawl() has, so both are driven together.
            let (outcome, ()) = tokio::join!(&mut crawl, crawler.stop());
            outcome
        }
    };

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            if let Some(ref pb) = progress_bar {
                pb.finish_and_clear();
            }
            return Err(format!("Failed to crawl {}: {}", base, e));
        }
    };

    if let Some(ref pb) = progress_bar {
        let total = processed_count.load(Ordering::Relaxed);
        let verb = if results.was_cancelled() {
            "Crawl cancelled!"
        } else {
            "Crawl complete!"
        };
        pb.finish_with_message(format!(
            "{} {} URLs processed, {} recorded",
            verb,
            total,
            results.len()
        ));
    }

    debug!("{}", crawl_summary(&results));
    if let Some(ref callback) = progress_callback {
        callback(crawl_summary(&results));
    }

    Ok(results)
}

/// One-line summary of a finished crawl
pub fn crawl_summary(results: &CrawlResults) -> String {
    let mut summary = format!(
        "Recorded {} resources ({} unique checksums)",
        results.len(),
        results.checksum_count()
    );
    if results.was_cancelled() {
        summary.push_str(", crawl was cancelled");
    }
    summary
}
