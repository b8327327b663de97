//! HTML helpers shared by site capabilities

use scraper::{Html, Selector};
use url::Url;

/// Text of the first element matching `selector`, trimmed; None if absent or blank
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves a link href against the page URL
///
/// Returns None for empty and fragment-only hrefs, for `javascript:`,
/// `mailto:`, `tel:` and `data:` links, and for anything that does not
/// resolve to an HTTP(S) URL.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
