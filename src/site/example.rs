//! The bundled example site
//!
//! Listing pages live at `{base-url}{list-url-template}{n}` for `n` in
//! `1..=lists-count`. Every `<h3><a href>` on a listing page links an item,
//! and an item page's record is its first `<h1>`.

use crate::config::SiteConfig;
use crate::fetch::FetchResult;
use crate::partition::RangeAssignment;
use crate::site::{first_text, resolve_link, SiteCapability, SiteError};
use crate::storage::Record;
use scraper::{Html, Selector};
use url::Url;

const ITEM_LINK_SELECTOR: &str = "h3 a[href]";
const HEADER_SELECTOR: &str = "h1";

pub struct ExampleSite {
    base_url: String,
    list_url_template: String,
    lists_count: u64,
    item_links: Selector,
    header: Selector,
}

impl ExampleSite {
    pub fn new(config: &SiteConfig) -> Result<Self, SiteError> {
        Url::parse(&config.base_url)
            .map_err(|e| SiteError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            list_url_template: config.list_url_template.clone(),
            lists_count: config.lists_count,
            item_links: selector(ITEM_LINK_SELECTOR)?,
            header: selector(HEADER_SELECTOR)?,
        })
    }

    /// Registry constructor
    pub fn construct(config: &SiteConfig) -> Result<Box<dyn SiteCapability>, SiteError> {
        Ok(Box::new(Self::new(config)?))
    }
}

fn selector(source: &str) -> Result<Selector, SiteError> {
    Selector::parse(source).map_err(|e| SiteError::Selector {
        selector: source.to_string(),
        reason: format!("{:?}", e),
    })
}

impl SiteCapability for ExampleSite {
    fn list_url_template(&self) -> &str {
        &self.list_url_template
    }

    fn lists_count(&self) -> u64 {
        self.lists_count
    }

    fn generate_list_urls(&self, range: RangeAssignment) -> Box<dyn Iterator<Item = String> + Send> {
        let prefix = format!("{}{}", self.base_url, self.list_url_template);
        Box::new(range.indices().map(move |index| format!("{}{}", prefix, index + 1)))
    }

    fn extract_discovered_urls(&self, page: &FetchResult) -> Result<Vec<String>, SiteError> {
        let Some(body) = page.body.as_deref() else {
            return Ok(Vec::new());
        };

        let base = Url::parse(&page.url).map_err(|e| SiteError::Extraction {
            url: page.url.clone(),
            reason: e.to_string(),
        })?;

        let document = Html::parse_document(body);
        let urls = document
            .select(&self.item_links)
            .filter_map(|link| link.value().attr("href"))
            .filter_map(|href| resolve_link(href, &base))
            .collect();

        Ok(urls)
    }

    fn extract_record(&self, page: &FetchResult) -> Result<Record, SiteError> {
        let mut record = Record::new(page.url.clone());

        if let Some(body) = page.body.as_deref() {
            let document = Html::parse_document(body);
            if let Some(header) = first_text(&document, &self.header) {
                record = record.with("h1", header);
            }
        }

        Ok(record)
    }
}
