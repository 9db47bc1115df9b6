// Report generation from crawl results

use crate::crawl::extract_url_path;
use serde::{Deserialize, Serialize};
use sitedig_scanner::{CrawlResults, ResultEntry};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use url::Url;

const DIVIDER: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

pub fn generate_report(
    results: &CrawlResults,
    base: &str,
    format: ReportFormat,
) -> Result<String, String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(results, base)),
        ReportFormat::Json => generate_json_report(results, base)
            .map_err(|e| format!("Failed to serialize report: {}", e)),
        ReportFormat::Csv => Ok(generate_csv_report(results)),
    }
}

/// Directory part of a URL's path, e.g. `/pages/` for `/pages/about.html`.
fn directory_of(url: &str) -> String {
    let path = extract_url_path(url);
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "/".to_string(),
    }
}

/// Last path segment plus query, `/` for a directory index.
fn file_label(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let name = parsed
        .path()
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("/");
    match parsed.query() {
        Some(query) => format!("{}?{}", name, query),
        None => name.to_string(),
    }
}

pub fn generate_text_report(results: &CrawlResults, base: &str) -> String {
    let mut report = String::new();

    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str("                          SITEDIG CRAWL REPORT\n");
    report.push_str(DIVIDER);
    report.push_str("\n\n");

    report.push_str(&format!("Target:           {}\n", base));
    report.push_str(&format!("Generated:        {}\n", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));
    report.push_str(&format!("Resources:        {}\n", results.len()));
    report.push_str(&format!("Unique checksums: {}\n", results.checksum_count()));
    if results.was_cancelled() {
        report.push_str("Status:           Cancelled (partial results)\n");
    } else {
        report.push_str("Status:           Completed\n");
    }
    report.push('\n');

    if results.is_empty() {
        report.push_str("  (nothing recorded)\n\n");
        return report;
    }

    let mut by_directory: BTreeMap<String, Vec<(&str, &ResultEntry)>> = BTreeMap::new();
    for (url, entry) in results.iter() {
        by_directory.entry(directory_of(url)).or_default().push((url, entry));
    }

    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str("SITE MAP\n");
    report.push_str(DIVIDER);
    report.push_str("\n\n");

    for (directory, entries) in &by_directory {
        report.push_str(&format!("## {}\n", directory));
        report.push_str(&format!("  {} resources\n\n", entries.len()));

        for (idx, (url, entry)) in entries.iter().enumerate() {
            let prefix = if idx == entries.len() - 1 { "└── " } else { "├── " };
            let mut line = format!(
                "  {}{}  [{} {}]",
                prefix,
                file_label(url),
                entry.encoding,
                entry.checksum
            );
            if !entry.source.is_empty() {
                line.push_str(&format!(" <- {}", extract_url_path(&entry.source)));
            }
            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(results: &CrawlResults, base: &str) -> Result<String, serde_json::Error> {
    let entries: serde_json::Map<String, serde_json::Value> = results
        .iter()
        .map(|(url, entry)| {
            let mut value = serde_json::json!({
                "source": entry.source,
                "encoding": entry.encoding,
                "checksum": entry.checksum,
            });
            if let Some(ref body) = entry.body {
                value["body"] = serde_json::json!(String::from_utf8_lossy(body));
            }
            if let Some(ref headers) = entry.headers {
                value["headers"] = serde_json::json!(headers);
            }
            (url.to_string(), value)
        })
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "sitedig",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "target": base,
            "summary": {
                "total_resources": results.len(),
                "unique_checksums": results.checksum_count(),
                "cancelled": results.was_cancelled()
            },
            "results": entries
        }
    });

    serde_json::to_string_pretty(&json_report)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn generate_csv_report(results: &CrawlResults) -> String {
    let mut report = String::from("url,source,encoding,checksum\n");
    for (url, entry) in results.iter() {
        report.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(url),
            csv_field(&entry.source),
            csv_field(&entry.encoding),
            csv_field(&entry.checksum)
        ));
    }
    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
