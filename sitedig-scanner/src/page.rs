use crate::config::SiteConfig;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use scraper::{Html, Selector};
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::{ParseError, Url};

/// Elements whose attribute holds an outbound reference.
pub const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("script", "src"),
    ("iframe", "src"),
    ("form", "action"),
];

static LINK_SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    LINK_ATTRIBUTES
        .iter()
        .map(|(tag, attr)| {
            (
                Selector::parse(tag).expect("tag names are valid selectors"),
                *attr,
            )
        })
        .collect()
});

/// Outcome of processing one fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub encoding: String,
    pub checksum: String,
    pub links: BTreeSet<String>,
}

/// One fetched resource on its way to a link set and a fingerprint.
///
/// A page whose bytes cannot be decoded with the declared encoding is
/// content-less: it is never parsed and [`Page::process`] yields `None`.
///
/// `Page` holds a parsed DOM, which is not `Send`; build and process it
/// without crossing an `.await`.
pub struct Page<'a> {
    site: &'a SiteConfig,
    encoding_label: String,
    current: Url,
    decoded: Option<(&'static Encoding, String)>,
    document: Option<Html>,
    links: BTreeSet<String>,
    discarded: BTreeSet<String>,
    checksum: OnceCell<String>,
}

impl<'a> Page<'a> {
    /// `current` is the URL the bytes were fetched from; the site's base URL
    /// is used when it is absent or unparsable.
    pub fn new(site: &'a SiteConfig, body: &[u8], encoding: &str, current: Option<&str>) -> Self {
        let current = match current.map(Url::parse) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                warn!("Invalid current URL ({}), falling back to base", e);
                site.base().clone()
            }
            None => site.base().clone(),
        };

        let decoded = decode(body, encoding);
        let document = decoded
            .as_ref()
            .map(|(_, text)| Html::parse_document(text));

        Self {
            site,
            encoding_label: encoding.to_string(),
            current,
            decoded,
            document,
            links: BTreeSet::new(),
            discarded: BTreeSet::new(),
            checksum: OnceCell::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.decoded.is_some()
    }

    pub fn encoding(&self) -> &str {
        &self.encoding_label
    }

    pub fn current(&self) -> &Url {
        &self.current
    }

    pub fn links(&self) -> &BTreeSet<String> {
        &self.links
    }

    /// Candidates rejected by [`Page::filter_links`] or [`Page::rebase_links`].
    pub fn discarded(&self) -> &BTreeSet<String> {
        &self.discarded
    }

    /// Collects every present link attribute verbatim.
    pub fn extract_links(&mut self) {
        let Some(document) = self.document.as_ref() else {
            return;
        };

        for (selector, attr) in LINK_SELECTORS.iter() {
            for element in document.select(selector) {
                if let Some(value) = element.value().attr(attr) {
                    self.links.insert(value.to_string());
                }
            }
        }
    }

    /// Keeps http(s) and scheme-less links that stay on the current host
    /// and carry no ignored path marker.
    pub fn filter_links(&mut self) {
        let candidates = std::mem::take(&mut self.links);
        for link in candidates {
            if self.is_acceptable(&link) {
                self.links.insert(link);
            } else {
                debug!("Discarding link {}", link);
                self.discarded.insert(link);
            }
        }
    }

    /// Turns the surviving links into absolute URLs anchored at the site base,
    /// fragments removed and queries kept.
    pub fn rebase_links(&mut self) {
        let candidates = std::mem::take(&mut self.links);
        for link in candidates {
            match self.rebase(&link) {
                Some(url) => {
                    self.links.insert(url);
                }
                None => {
                    debug!("Unable to rebase link {}", link);
                    self.discarded.insert(link);
                }
            }
        }
    }

    /// MD5 hex digest of the decoded content re-encoded with its encoding.
    /// Computed on first access.
    pub fn checksum(&self) -> Option<&str> {
        let (encoding, text) = self.decoded.as_ref()?;
        Some(
            self.checksum
                .get_or_init(|| compute_checksum(encoding, text))
                .as_str(),
        )
    }

    pub fn process(&mut self) -> Option<PageSummary> {
        if !self.has_content() {
            debug!("No content to process for {}", self.current);
            return None;
        }

        self.extract_links();
        self.filter_links();
        self.rebase_links();

        let checksum = self.checksum()?.to_string();
        Some(PageSummary {
            encoding: self.encoding_label.clone(),
            checksum,
            links: self.links.clone(),
        })
    }

    fn is_acceptable(&self, link: &str) -> bool {
        match Url::parse(link) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https") {
                    return false;
                }
                if self.site.contains_ignored_marker(strip_query_and_fragment(link)) {
                    return false;
                }
                self.is_same_origin(&url)
            }
            Err(ParseError::RelativeUrlWithoutBase) => {
                if self.site.contains_ignored_marker(link) {
                    return false;
                }
                // Only scheme-relative links can leave the current host here.
                match self.current.join(link) {
                    Ok(url) => self.is_same_origin(&url),
                    Err(_) => false,
                }
            }
            Err(_) => false,
        }
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.host_str() == self.current.host_str() && url.port() == self.current.port()
    }

    fn rebase(&self, link: &str) -> Option<String> {
        let base = self.site.base();
        let reference = match Url::parse(link) {
            Ok(url) => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            Err(_) => strip_fragment(link).to_string(),
        };

        let mut resolved = base.join(&reference).ok()?;
        resolved.set_fragment(None);

        if resolved.host_str() != base.host_str() || resolved.port() != base.port() {
            return None;
        }
        Some(resolved.into())
    }
}

fn decode(body: &[u8], label: &str) -> Option<(&'static Encoding, String)> {
    let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) else {
        warn!("Unknown encoding label '{}', skipping content", label);
        return None;
    };

    match encoding.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => Some((encoding, text.into_owned())),
        None => {
            warn!("Content is not valid {}, binary?", encoding.name());
            None
        }
    }
}

fn compute_checksum(encoding: &'static Encoding, text: &str) -> String {
    format!("{:x}", md5::compute(encode_as(encoding, text)))
}

/// Re-encodes `text` in `encoding`. encoding_rs only encodes to ASCII
/// compatible encodings, so UTF-16 is serialised by hand.
fn encode_as(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    if encoding == UTF_16LE {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    } else if encoding == UTF_16BE {
        text.encode_utf16().flat_map(u16::to_be_bytes).collect()
    } else {
        encoding.encode(text).0.into_owned()
    }
}

fn strip_fragment(link: &str) -> &str {
    link.split_once('#').map_or(link, |(head, _)| head)
}

fn strip_query_and_fragment(link: &str) -> &str {
    link.split(['?', '#']).next().unwrap_or(link)
}
