//! HTTP client for the distributed controller

use crate::controller::SafetyResponse;
use crate::fetch::build_http_client;
use crate::partition::RangeAssignment;
use crate::rotation::{RotationError, SafetyCheck};
use crate::storage::Record;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Client used by distributed workers
///
/// Requests go straight to the controller, never through the harvesting proxy.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    client: Client,
    base_url: Url,
}

impl ControllerClient {
    /// Creates a client for the controller at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| HarvestError::Controller(format!("invalid URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: build_http_client(None, timeout)?,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| HarvestError::Controller(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Liveness check
    pub async fn health(&self) -> Result<()> {
        self.client
            .get(self.endpoint("health")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Next range from the shared partitioner
    pub async fn list_range(&self) -> Result<RangeAssignment> {
        let range = self
            .client
            .get(self.endpoint("list-range")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(range)
    }

    /// Asks whether `address` is safe; a safe answer also records it
    pub async fn ip_is_safe(&self, address: IpAddr) -> Result<bool> {
        let response: SafetyResponse = self
            .client
            .get(self.endpoint(&format!("ip-safe/{}", address))?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.safe)
    }

    /// Stores a record in the controller's store
    pub async fn insert_record(&self, record: &Record) -> Result<()> {
        self.client
            .post(self.endpoint("records")?)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Commits the controller's store
    pub async fn commit(&self) -> Result<()> {
        self.client
            .get(self.endpoint("commit")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl SafetyCheck for ControllerClient {
    async fn check_and_record(&self, candidate: IpAddr) -> std::result::Result<bool, RotationError> {
        self.ip_is_safe(candidate)
            .await
            .map_err(|e| RotationError::AuthorityUnavailable(e.to_string()))
    }
}
