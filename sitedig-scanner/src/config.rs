use crate::error::{Result, ScanError};
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

/// Content types a fetched resource must declare to be processed.
pub const DEFAULT_ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "text/xml",
    "text/plain",
    "text/javascript",
    "application/javascript",
    "application/json",
    "application/xml",
    "application/xhtml+xml",
];

pub const DEFAULT_IGNORED_STATUS_CODES: &[u16] = &[403, 404];

/// Fragments left behind by unrendered templates, e.g. `href="' + path + '"`.
pub const DEFAULT_IGNORED_PATH_MARKERS: &[&str] = &["' + ", "\\'"];

pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("sitedig/", env!("CARGO_PKG_VERSION"));

/// Immutable description of one crawl.
///
/// Built once through [`SiteConfigBuilder`] and shared read-only with every
/// worker for the lifetime of the crawl.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    base: Url,
    deduplicate: bool,
    workers: usize,
    limit: Option<usize>,
    accepted_content_types: Vec<String>,
    ignored_status_codes: BTreeSet<u16>,
    verify_tls: bool,
    max_body_size: usize,
    ignored_path_markers: Vec<String>,
    store_body: bool,
    store_headers: bool,
    timeout: Duration,
    user_agent: String,
}

impl SiteConfig {
    pub fn builder(base: impl Into<String>) -> SiteConfigBuilder {
        SiteConfigBuilder::new(base)
    }

    /// Shorthand for a configuration with every default.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Self::builder(base).build()
    }

    /// Base URL with its fragment removed. Also the crawl seed.
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn deduplicate(&self) -> bool {
        self.deduplicate
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Discovery limit; `None` means unbounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn accepted_content_types(&self) -> &[String] {
        &self.accepted_content_types
    }

    pub fn ignored_status_codes(&self) -> &BTreeSet<u16> {
        &self.ignored_status_codes
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn ignored_path_markers(&self) -> &[String] {
        &self.ignored_path_markers
    }

    pub fn store_body(&self) -> bool {
        self.store_body
    }

    pub fn store_headers(&self) -> bool {
        self.store_headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn is_limit_reached(&self, recorded: usize) -> bool {
        self.limit.is_some_and(|limit| recorded >= limit)
    }

    /// Compares the MIME essence (parameters stripped, case-insensitive).
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.accepted_content_types.iter().any(|ct| *ct == essence)
    }

    pub fn ignores_status(&self, status: u16) -> bool {
        self.ignored_status_codes.contains(&status)
    }

    pub fn contains_ignored_marker(&self, candidate: &str) -> bool {
        self.ignored_path_markers
            .iter()
            .any(|marker| candidate.contains(marker.as_str()))
    }
}

pub struct SiteConfigBuilder {
    base: String,
    deduplicate: bool,
    workers: usize,
    limit: usize,
    accepted_content_types: Vec<String>,
    ignored_status_codes: BTreeSet<u16>,
    verify_tls: bool,
    max_body_size: usize,
    ignored_path_markers: Vec<String>,
    store_body: bool,
    store_headers: bool,
    timeout: Duration,
    user_agent: String,
}

impl SiteConfigBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            deduplicate: true,
            workers: DEFAULT_WORKERS,
            limit: 0,
            accepted_content_types: DEFAULT_ACCEPTED_CONTENT_TYPES
                .iter()
                .map(|ct| ct.to_string())
                .collect(),
            ignored_status_codes: DEFAULT_IGNORED_STATUS_CODES.iter().copied().collect(),
            verify_tls: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            ignored_path_markers: DEFAULT_IGNORED_PATH_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            store_body: false,
            store_headers: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// `0` disables the discovery limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_accepted_content_types<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_content_types = content_types
            .into_iter()
            .map(|ct| ct.into().trim().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_ignored_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.ignored_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_ignored_path_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_path_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_store_body(mut self, store_body: bool) -> Self {
        self.store_body = store_body;
        self
    }

    pub fn with_store_headers(mut self, store_headers: bool) -> Self {
        self.store_headers = store_headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<SiteConfig> {
        let mut base = Url::parse(&self.base)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", self.base, e)))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "{}: only http and https are supported",
                self.base
            )));
        }
        if base.host_str().is_none() {
            return Err(ScanError::InvalidUrl(format!("{}: missing host", self.base)));
        }
        base.set_fragment(None);

        if self.workers == 0 {
            return Err(ScanError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(ScanError::InvalidConfig(
                "maximum body size must be greater than 0".to_string(),
            ));
        }
        if self.accepted_content_types.is_empty() {
            return Err(ScanError::InvalidConfig(
                "at least one accepted content type is required".to_string(),
            ));
        }

        Ok(SiteConfig {
            base,
            deduplicate: self.deduplicate,
            workers: self.workers,
            limit: (self.limit > 0).then_some(self.limit),
            accepted_content_types: self.accepted_content_types,
            ignored_status_codes: self.ignored_status_codes,
            verify_tls: self.verify_tls,
            max_body_size: self.max_body_size,
            ignored_path_markers: self
                .ignored_path_markers
                .into_iter()
                .filter(|m| !m.is_empty())
                .collect(),
            store_body: self.store_body,
            store_headers: self.store_headers,
            timeout: self.timeout,
            user_agent: self.user_agent,
        })
    }
}
