use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What the crawl knows about one recorded URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Page the URL was discovered on; empty for the seed.
    pub source: String,
    pub encoding: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The URL already has an entry.
    KnownUrl,
    /// Deduplication is on and another URL already owns this checksum.
    DuplicateContent { original: String },
}

/// The crawl's output: URL → entry, plus the checksum → first-owner index.
///
/// Both maps only ever grow during a crawl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlResults {
    entries: BTreeMap<String, ResultEntry>,
    #[serde(skip)]
    checksums: HashMap<String, String>,
    #[serde(skip)]
    cancelled: bool,
}

impl CrawlResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the dedup/record decision for a fully built entry.
    ///
    /// With deduplication off every new URL is recorded; the checksum index
    /// still remembers only the first URL seen for each checksum.
    pub fn record(&mut self, url: &str, entry: ResultEntry, deduplicate: bool) -> RecordOutcome {
        if self.entries.contains_key(url) {
            return RecordOutcome::KnownUrl;
        }
        if deduplicate && let Some(original) = self.checksums.get(&entry.checksum) {
            return RecordOutcome::DuplicateContent {
                original: original.clone(),
            };
        }

        self.checksums
            .entry(entry.checksum.clone())
            .or_insert_with(|| url.to_string());
        self.entries.insert(url.to_string(), entry);
        RecordOutcome::Recorded
    }

    pub fn get(&self, url: &str) -> Option<&ResultEntry> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResultEntry)> {
        self.entries.iter().map(|(url, entry)| (url.as_str(), entry))
    }

    pub fn entries(&self) -> &BTreeMap<String, ResultEntry> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, ResultEntry> {
        self.entries
    }

    /// First URL that produced `checksum`.
    pub fn checksum_owner(&self, checksum: &str) -> Option<&str> {
        self.checksums.get(checksum).map(String::as_str)
    }

    pub fn checksum_count(&self) -> usize {
        self.checksums.len()
    }

    /// Whether the crawl that produced these results was stopped early.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn mark_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}
