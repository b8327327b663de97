//! Where a worker obtains its slice of the index space

use crate::config::Config;
use crate::controller::ControllerClient;
use crate::partition::{RangeAssignment, RangeDirection, RangePartitioner};
use crate::Result;

/// Source of the range this worker harvests
pub enum RangeSource {
    /// Computed in-process from this worker's identity
    Local(RangeAssignment),

    /// Handed out by the controller's shared partitioner
    Remote(ControllerClient),
}

impl RangeSource {
    /// Chooses the range source for a configuration
    ///
    /// A configured controller URL makes the worker distributed and the
    /// controller decides its range; otherwise the range is evaluated locally
    /// from `scrapers-count` and `worker-id`.
    pub fn from_config(config: &Config, client: Option<ControllerClient>) -> Result<Self> {
        if let Some(client) = client {
            return Ok(Self::Remote(client));
        }

        let partitioner = RangePartitioner::new(
            config.site.lists_count,
            config.partition.scrapers_count,
            RangeDirection::from_descending(config.partition.descending),
        )?;
        let assignment = partitioner.assignment_for(config.partition.worker_id)?;

        Ok(Self::Local(assignment))
    }

    /// Obtains the assignment
    pub async fn fetch(&self) -> Result<RangeAssignment> {
        match self {
            Self::Local(assignment) => Ok(*assignment),
            Self::Remote(client) => client.list_range().await,
        }
    }
}
