use crate::config::SiteConfig;
use crate::error::Result;
use encoding_rs::Encoding;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How far into a body to look for a `<meta charset>` declaration.
const CHARSET_SNIFF_LEN: usize = 1024;
const DEFAULT_ENCODING: &str = "utf-8";

/// A response that passed every fetch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub body: Vec<u8>,
    pub encoding: String,
    pub headers: BTreeMap<String, String>,
}

/// Retrieves one resource.
///
/// Implementations swallow their own failures: a rejected or failed fetch
/// is `None`, never an error, so one bad resource cannot abort a crawl.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Option<FetchedResource>> + Send;
}

/// reqwest-backed fetcher applying the site's TLS, status, content-type and
/// body-size policies.
pub struct HttpFetcher {
    client: Client,
    config: Arc<SiteConfig>,
}

impl HttpFetcher {
    pub fn new(config: Arc<SiteConfig>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout())
            .connect_timeout(config.timeout() / 2)
            .pool_max_idle_per_host(50) // Connection pooling
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .danger_accept_invalid_certs(!config.verify_tls())
            .build()?;

        Ok(Self { client, config })
    }

    async fn try_fetch(&self, url: &str) -> Result<Option<FetchedResource>> {
        debug!("Fetching {}", url);
        let mut response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        if self.config.ignores_status(status) {
            debug!("Status {} for {}, skip processing", status, url);
            return Ok(None);
        }

        // Servers that omit the header are treated like application/octet-stream.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !self.config.accepts_content_type(&content_type) {
            debug!("Unsupported Content-Type {} for {}", content_type, url);
            return Ok(None);
        }

        let headers = collect_headers(response.headers());

        let limit = self.config.max_body_size();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if !append_capped(&mut body, &chunk, limit) {
                debug!("Body of {} truncated to {} bytes", url, limit);
                break;
            }
        }

        if body.is_empty() {
            debug!("Empty body for {}, skip processing", url);
            return Ok(None);
        }

        let encoding = detect_encoding(&content_type, &body);
        debug!(
            "Received response with Content-Type {} ({}) for {}",
            content_type, encoding, url
        );

        Ok(Some(FetchedResource {
            body,
            encoding,
            headers,
        }))
    }
}

/// Appends as much of `chunk` as fits under `limit`. Returns false once
/// bytes had to be dropped.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let remaining = limit.saturating_sub(body.len());
    if chunk.len() > remaining {
        body.extend_from_slice(&chunk[..remaining]);
        return false;
    }
    body.extend_from_slice(chunk);
    true
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<FetchedResource> {
        match self.try_fetch(url).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!("Fetch error for {}: {}", url, e);
                None
            }
        }
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    collected
}

/// Encoding label for a body: the `charset` parameter of its Content-Type,
/// else a `<meta charset>` near the top of the document, else UTF-8.
pub fn detect_encoding(content_type: &str, body: &[u8]) -> String {
    charset_from_content_type(content_type)
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or_else(|| DEFAULT_ENCODING.to_string())
}

pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
        .filter(|label| !label.is_empty())
}

pub fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(CHARSET_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    for (start, _) in head.match_indices("<meta") {
        let tag = &head[start..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        let Some(pos) = tag.find("charset=") else {
            continue;
        };
        let label: String = tag[pos + "charset=".len()..]
            .trim_start_matches(['"', '\'', ' '])
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
            .collect();
        if Encoding::for_label(label.as_bytes()).is_some() {
            return Some(label);
        }
    }
    None
}
