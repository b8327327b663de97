//! The single decision point for exit address safety

use crate::rotation::{Retention, RotationError, UsedIpSet};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Decides whether exit addresses are safe and remembers used ones
///
/// The real address is looked up once at startup and never considered safe.
#[derive(Debug)]
pub struct IpAuthority {
    real_address: IpAddr,
    used: Mutex<UsedIpSet>,
}

impl IpAuthority {
    pub fn new(real_address: IpAddr, retention: Retention) -> Self {
        Self {
            real_address,
            used: Mutex::new(UsedIpSet::new(retention)),
        }
    }

    pub fn real_address(&self) -> IpAddr {
        self.real_address
    }

    /// Returns false for the real address and for any remembered address
    pub fn is_safe(&self, candidate: IpAddr) -> bool {
        candidate != self.real_address && !self.used().contains(&candidate)
    }

    pub fn record_used(&self, candidate: IpAddr) {
        self.used().insert(candidate);
    }

    /// Checks a candidate and, if safe, records it under the same lock
    ///
    /// Two callers asking about the same address can never both get `true`.
    pub fn check_and_record(&self, candidate: IpAddr) -> bool {
        if candidate == self.real_address {
            return false;
        }

        let mut used = self.used();
        if used.contains(&candidate) {
            return false;
        }
        used.insert(candidate);
        true
    }

    pub fn used_count(&self) -> usize {
        self.used().len()
    }

    fn used(&self) -> MutexGuard<'_, UsedIpSet> {
        // The set is always left consistent, so a poisoned lock is still usable
        self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Answers "is this candidate safe?" and records it when it is
#[async_trait]
pub trait SafetyCheck: Send + Sync {
    async fn check_and_record(&self, candidate: IpAddr) -> Result<bool, RotationError>;
}

/// Safety check against an in-process authority
#[derive(Debug, Clone)]
pub struct LocalSafety {
    authority: Arc<IpAuthority>,
}

impl LocalSafety {
    pub fn new(authority: Arc<IpAuthority>) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl SafetyCheck for LocalSafety {
    async fn check_and_record(&self, candidate: IpAddr) -> Result<bool, RotationError> {
        Ok(self.authority.check_and_record(candidate))
    }
}
