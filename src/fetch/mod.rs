//! Fetching and response classification
//!
//! This module contains:
//! - The HTTP fetcher that sends every request through the anonymizing proxy
//!   with a randomized client identity
//! - The typed [`FetchResult`] every fetch is converted into, failures included
//! - The retry classification deciding whether a result goes back to the work
//!   queue or on to extraction

mod classify;
mod fetcher;

pub use classify::{Classify, Disposition, RetryPolicy, StatusClassifier};
pub use fetcher::{build_http_client, Fetch, HttpFetcher, TIMEOUT_STATUS, UNAVAILABLE_STATUS};

/// Outcome of a single GET request
///
/// Transport failures never surface as errors: they are folded into a status
/// code (see [`TIMEOUT_STATUS`] and [`UNAVAILABLE_STATUS`]) with no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The URL as it was requested (not the post-redirect URL)
    pub url: String,

    /// HTTP status code, or a synthetic one for transport failures
    pub status: u16,

    /// Response body, absent when the request never produced one
    pub body: Option<String>,
}

impl FetchResult {
    pub fn new(url: impl Into<String>, status: u16, body: Option<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body,
        }
    }

    /// Builds a body-less result for a request that failed in transport
    pub fn failed(url: impl Into<String>, status: u16) -> Self {
        Self::new(url, status, None)
    }

    /// Returns true for 2xx responses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for client/server error statuses (>= 400)
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Returns the body or an empty string
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}
