pub mod config;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod frontier;
pub mod page;
pub mod result;

pub use config::{SiteConfig, SiteConfigBuilder};
pub use crawler::{Crawler, ProgressCallback, ResultCallback};
pub use error::ScanError;
pub use fetch::{Fetch, FetchedResource, HttpFetcher};
pub use frontier::{Frontier, FrontierEntry};
pub use page::{Page, PageSummary};
pub use result::{CrawlResults, RecordOutcome, ResultEntry};
