// Tests for crawl execution

use sitedig_core::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlResultCallback, crawl_summary, execute_crawl,
    extract_url_path,
};
use sitedig_scanner::{ResultEntry, SiteConfig};
use std::sync::{Arc, Mutex};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

// ============================================================================
// URL Path Extraction Tests
// ============================================================================

#[test]
fn test_extract_url_path_root() {
    assert_eq!(extract_url_path("http://example.com/"), "/");
    assert_eq!(extract_url_path("http://example.com"), "/");
}

#[test]
fn test_extract_url_path_nested() {
    assert_eq!(extract_url_path("http://example.com/pages/about.html"), "/pages/about.html");
}

#[test]
fn test_extract_url_path_drops_query_and_fragment() {
    assert_eq!(extract_url_path("http://example.com/page2.html?arg=2#top"), "/page2.html");
}

#[test]
fn test_extract_url_path_with_port() {
    assert_eq!(extract_url_path("http://127.0.0.1:8000/code.js"), "/code.js");
}

#[test]
fn test_extract_url_path_invalid_url() {
    let url = "not a valid url";
    // Should return original string for invalid URLs
    assert_eq!(extract_url_path(url), url);
}

// ============================================================================
// Crawl Execution Tests
// ============================================================================

async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_bytes(body.as_bytes().to_vec()),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_execute_crawl_collects_site() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<a href="about.html">About</a><a href="https://elsewhere.test/">Away</a>"#,
    )
    .await;
    mount_html(&server, "/about.html", r#"<a href="/">Home</a><p>About us</p>"#).await;

    let site = SiteConfig::builder(server.uri())
        .with_workers(2)
        .build()
        .unwrap();
    let options = CrawlOptions {
        site,
        show_progress_bars: false,
    };

    let messages = Arc::new(Mutex::new(Vec::new()));
    let progress: CrawlProgressCallback = {
        let messages = messages.clone();
        Arc::new(move |msg: String| messages.lock().unwrap().push(msg))
    };

    let results = execute_crawl(options, Some(progress), None).await.unwrap();

    let base = format!("{}/", server.uri());
    assert_eq!(results.len(), 2);
    assert!(results.contains(&base));
    assert_eq!(
        results.get(&format!("{}about.html", base)).unwrap().source,
        base
    );

    let messages = messages.lock().unwrap();
    assert_eq!(messages.first().unwrap(), &format!("Crawling {}", base));
    assert_eq!(messages.last().unwrap(), &crawl_summary(&results));
}

#[tokio::test]
async fn test_execute_crawl_reports_each_result() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="a.html">A</a><a href="b.html">B</a>"#).await;
    mount_html(&server, "/a.html", "<p>A</p>").await;
    mount_html(&server, "/b.html", "<p>B</p>").await;

    let options = CrawlOptions {
        site: SiteConfig::new(server.uri()).unwrap(),
        show_progress_bars: false,
    };

    let seen: Arc<Mutex<Vec<(String, ResultEntry)>>> = Arc::new(Mutex::new(Vec::new()));
    let on_result: CrawlResultCallback = {
        let seen = seen.clone();
        Arc::new(move |url: String, entry: ResultEntry| seen.lock().unwrap().push((url, entry)))
    };

    let results = execute_crawl(options, None, Some(on_result)).await.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(seen.len(), 3);
    for (url, entry) in &seen {
        assert_eq!(results.get(url), Some(entry));
    }
}

#[tokio::test]
async fn test_execute_crawl_unreachable_site_is_empty() {
    let options = CrawlOptions {
        site: SiteConfig::new("http://127.0.0.1:9/").unwrap(),
        show_progress_bars: false,
    };

    let results = execute_crawl(options, None, None).await.unwrap();
    assert!(results.is_empty());
    assert!(!results.was_cancelled());
}
