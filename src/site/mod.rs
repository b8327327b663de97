//! Site capabilities
//!
//! A site capability knows one target: how to enumerate its listing pages,
//! how to tell listing pages from item pages, and how to pull item links and
//! record properties out of a fetched page. Capabilities are selected by the
//! `kind` configuration key through an explicit [`SiteRegistry`].

mod example;
mod html;
mod registry;

pub use example::ExampleSite;
pub use html::{first_text, resolve_link};
pub use registry::{SiteConstructor, SiteRegistry};

use crate::fetch::FetchResult;
use crate::partition::RangeAssignment;
use crate::storage::Record;
use thiserror::Error;

/// Errors raised by site capabilities
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Unknown site kind: {0}")]
    UnknownKind(String),

    #[error("Invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Invalid site URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to extract from {url}: {reason}")]
    Extraction { url: String, reason: String },
}

/// What the extractor produced from one fetched page
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// Item links found on a listing page
    ItemUrls(Vec<String>),

    /// Properties of an item page
    Record(Record),
}

/// Target-specific knowledge used by the pipeline
pub trait SiteCapability: Send + Sync {
    /// URL fragment shared by all listing pages
    fn list_url_template(&self) -> &str;

    /// Total number of listing pages
    fn lists_count(&self) -> u64;

    /// Listing page URLs for an index range, in harvesting order
    fn generate_list_urls(&self, range: RangeAssignment) -> Box<dyn Iterator<Item = String> + Send>;

    /// Item links on a listing page
    fn extract_discovered_urls(&self, page: &FetchResult) -> Result<Vec<String>, SiteError>;

    /// Properties of an item page; `url` is always the requested URL
    fn extract_record(&self, page: &FetchResult) -> Result<Record, SiteError>;

    fn is_listing(&self, url: &str) -> bool {
        url.contains(self.list_url_template())
    }
}

/// Runs the extraction matching the page kind
pub fn extract(site: &dyn SiteCapability, page: &FetchResult) -> Result<Extracted, SiteError> {
    if site.is_listing(&page.url) {
        site.extract_discovered_urls(page).map(Extracted::ItemUrls)
    } else {
        site.extract_record(page).map(Extracted::Record)
    }
}
