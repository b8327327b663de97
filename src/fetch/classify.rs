//! Retry classification of fetch results

use crate::config::PipelineConfig;
use crate::fetch::FetchResult;
use std::collections::BTreeSet;

/// Which failed statuses are worth another attempt in a later batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Every error status at or above the threshold
    Threshold(u16),

    /// Exactly the listed statuses
    Codes(BTreeSet<u16>),
}

impl RetryPolicy {
    /// Builds the policy from configuration; an explicit code list wins
    pub fn from_config(config: &PipelineConfig) -> Self {
        match &config.retry_status_codes {
            Some(codes) => Self::Codes(codes.iter().copied().collect()),
            None => Self::Threshold(config.retry_from_status),
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        match self {
            Self::Threshold(min) => status >= *min,
            Self::Codes(codes) => codes.contains(&status),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Threshold(408)
    }
}

/// Where a fetch result goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Push the URL back onto the work queue
    Retry,

    /// Hand the result to the extractor
    Extract,

    /// Push the URL back and switch the exit address before the next batch
    RetryAfterRotation,
}

impl Disposition {
    pub fn requests_rotation(self) -> bool {
        self == Self::RetryAfterRotation
    }
}

/// Decides the disposition of a fetch result
///
/// The pipeline holds this as a trait object so a deployment can substitute
/// its own rules, e.g. answering [`Disposition::RetryAfterRotation`] when an
/// API body reports an exhausted quota.
pub trait Classify: Send + Sync {
    fn classify(&self, result: &FetchResult) -> Disposition;
}

/// Default classifier: retry error statuses that fall in the retry class
///
/// Statuses marked with [`StatusClassifier::with_rotation_statuses`] (a
/// rate limit such as 429, say) are retried through a fresh exit address.
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    policy: RetryPolicy,
    rotate_on: BTreeSet<u16>,
}

impl StatusClassifier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rotate_on: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(RetryPolicy::from_config(config))
            .with_rotation_statuses(config.rotate_status_codes.iter().copied())
    }

    pub fn with_rotation_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.rotate_on.extend(statuses);
        self
    }
}

impl Classify for StatusClassifier {
    fn classify(&self, result: &FetchResult) -> Disposition {
        if !result.is_error() {
            Disposition::Extract
        } else if self.rotate_on.contains(&result.status) {
            Disposition::RetryAfterRotation
        } else if self.policy.is_retryable(result.status) {
            Disposition::Retry
        } else {
            Disposition::Extract
        }
    }
}
