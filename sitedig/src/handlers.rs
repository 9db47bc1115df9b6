use crate::commands::DEFAULT_LIMIT;
use clap::ArgMatches;
use colored::Colorize;
use sitedig_core::crawl::{CrawlOptions, CrawlProgressCallback, execute_crawl};
use sitedig_core::report::{ReportFormat, generate_report, save_report};
use sitedig_scanner::SiteConfig;
use sitedig_scanner::config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use url::Url;

/// Install the stderr log subscriber. `-v` raises the level from WARN to
/// INFO, `-vv` to DEBUG and `-vvv` to TRACE.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // A second initialisation (tests, repeated calls) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();

    // Try to parse as-is
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    // Try adding http://
    let with_scheme = format!("http://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some()
    {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow().bold(), line);
    None
}

/// Map `crawl` arguments onto a validated [`SiteConfig`].
pub fn build_site_config(args: &ArgMatches) -> Result<SiteConfig, String> {
    let raw_url = args
        .get_one::<String>("url")
        .ok_or_else(|| "--url must be provided".to_string())?;
    let url = parse_url_line(raw_url).ok_or_else(|| format!("Invalid URL '{}'", raw_url))?;

    let mut builder = SiteConfig::builder(url)
        .with_workers(*args.get_one::<usize>("threads").unwrap_or(&DEFAULT_WORKERS))
        .with_limit(*args.get_one::<usize>("limit").unwrap_or(&DEFAULT_LIMIT))
        .with_deduplicate(!args.get_flag("keep-duplicates"))
        .with_store_body(args.get_flag("store-body"))
        .with_store_headers(args.get_flag("store-headers"))
        .with_verify_tls(!args.get_flag("insecure"))
        .with_max_body_size(
            *args
                .get_one::<usize>("max-body-size")
                .unwrap_or(&DEFAULT_MAX_BODY_SIZE),
        )
        .with_timeout(Duration::from_secs(
            *args.get_one::<u64>("timeout").unwrap_or(&DEFAULT_TIMEOUT_SECS),
        ));

    if let Some(user_agent) = args.get_one::<String>("user-agent") {
        builder = builder.with_user_agent(user_agent.as_str());
    }
    if let Some(content_types) = args.get_many::<String>("accept") {
        builder = builder.with_accepted_content_types(content_types.cloned());
    }
    if let Some(codes) = args.get_many::<u16>("ignore-status") {
        builder = builder.with_ignored_status_codes(codes.copied());
    }
    if let Some(markers) = args.get_many::<String>("ignore-marker") {
        builder = builder.with_ignored_path_markers(markers.cloned());
    }

    builder.build().map_err(|e| e.to_string())
}

/// Expand a leading `~` in a user-supplied output path.
pub fn resolve_output_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Write the report to `output`, or to stdout when no path is given.
pub fn write_output(report: &str, output: Option<&str>) -> Result<Option<PathBuf>, String> {
    match output {
        Some(path) => {
            let path = resolve_output_path(path);
            save_report(report, &path)
                .map_err(|e| format!("Failed to write report to {}: {}", path.display(), e))?;
            Ok(Some(path))
        }
        None => {
            print!("{}", report);
            Ok(None)
        }
    }
}

fn print_crawl_configuration(site: &SiteConfig) {
    let limit = site
        .limit()
        .map(|limit| limit.to_string())
        .unwrap_or_else(|| "unbounded".to_string());

    eprintln!(
        "{} Crawling {}",
        "→".blue().bold(),
        site.base().as_str().bright_white()
    );
    eprintln!("  Workers:     {}", site.workers().to_string().cyan());
    eprintln!("  Limit:       {}", limit.cyan());
    eprintln!(
        "  Deduplicate: {}",
        (if site.deduplicate() { "yes" } else { "no" }).cyan()
    );
    if !site.verify_tls() {
        eprintln!("  {}", "TLS verification disabled".yellow());
    }
    eprintln!();
}

pub async fn handle_crawl(args: &ArgMatches) -> Result<(), String> {
    init_tracing(args.get_count("verbose"));

    let quiet = args.get_flag("quiet");
    let site = build_site_config(args)?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<String>("output").map(String::as_str);
    let base = site.base().to_string();

    if !quiet {
        print_crawl_configuration(&site);
    }

    let options = CrawlOptions {
        site,
        show_progress_bars: !quiet,
    };
    let progress_callback: Option<CrawlProgressCallback> = (!quiet).then(|| {
        let callback: CrawlProgressCallback =
            Arc::new(|msg: String| eprintln!("{} {}", "→".blue(), msg));
        callback
    });

    let results = execute_crawl(options, progress_callback, None).await?;
    if results.was_cancelled() {
        eprintln!(
            "{} Crawl interrupted, reporting partial results",
            "⚠".yellow().bold()
        );
    }

    let report = generate_report(&results, &base, format)?;
    if let Some(path) = write_output(&report, output)?
        && !quiet
    {
        eprintln!(
            "{} Report saved to {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        );
    }

    Ok(())
}
