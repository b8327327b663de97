//! HTTP fetcher implementation
//!
//! Every request goes through the configured local proxy (the entry point of
//! the anonymizing network), carries a user agent picked at random, and is
//! bounded by the configured timeout. Failures are converted into synthetic
//! status codes instead of being returned as errors.

use crate::config::ProxyConfig;
use crate::fetch::FetchResult;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Proxy};
use std::time::Duration;

/// Status assigned to requests that timed out
pub const TIMEOUT_STATUS: u16 = 408;

/// Status assigned to requests that failed for any other transport reason
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Fetch transport used by the producer stage
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Issues one GET request; never fails, see [`FetchResult`]
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Builds an HTTP client for harvesting
///
/// Connections are not pooled: each request opens a fresh connection through
/// the proxy so that a renewed exit circuit takes effect immediately.
///
/// # Arguments
///
/// * `proxy` - Optional proxy URL all traffic is sent through
/// * `timeout` - Total per-request timeout
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(0)
        .danger_accept_invalid_certs(true)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// reqwest-backed [`Fetch`] implementation
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    /// Creates a fetcher from proxy settings and a request timeout
    pub fn new(config: &ProxyConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.http_proxy.as_deref(), timeout)?;
        Ok(Self::with_client(client, config.user_agents.clone()))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, user_agents: Vec<String>) -> Self {
        Self {
            client,
            user_agents,
        }
    }

    fn pick_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return concat!("sumi-harvest/", env!("CARGO_PKG_VERSION"));
        }
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let status = transport_status(&e);
                tracing::error!("{} - {} - {}", status, url, e);
                return FetchResult::failed(url, status);
            }
        };

        let status = response.status().as_u16();
        if response.url().as_str() != url {
            tracing::warn!("Requested {} got {}", url, response.url());
        }

        match response.text().await {
            Ok(body) => {
                if status >= 400 {
                    tracing::error!("{} - {}", status, url);
                } else {
                    tracing::debug!("{} - {}", status, url);
                }
                FetchResult::new(url, status, Some(body))
            }
            Err(e) => {
                let status = transport_status(&e);
                tracing::error!("{} - {} - reading body failed: {}", status, url, e);
                FetchResult::failed(url, status)
            }
        }
    }
}

/// Maps a transport error onto the synthetic status it is reported as
fn transport_status(error: &reqwest::Error) -> u16 {
    if error.is_timeout() {
        TIMEOUT_STATUS
    } else {
        UNAVAILABLE_STATUS
    }
}
