//! Exit address rotation
//!
//! This module owns all exit address bookkeeping:
//! - [`UsedIpSet`] remembers addresses already used, with FIFO or retain-all retention
//! - [`IpAuthority`] decides whether a candidate is safe and records it atomically
//! - [`TorNetwork`] renews circuits over the Tor control port and reads the
//!   current exit address through the proxy
//! - [`IpChanger`] runs the rotation protocol on top of the two
//!
//! Pipeline code only ever calls [`IpRotator::get_new_ip`].

mod authority;
mod changer;
mod tor;
mod used_ips;

pub use authority::{IpAuthority, LocalSafety, SafetyCheck};
pub use changer::{IpChanger, IpRotator};
pub use tor::{lookup_real_address, ExitNetwork, TorNetwork};
pub use used_ips::{Retention, UsedIpSet};

use thiserror::Error;

/// Errors raised while rotating the exit address
#[derive(Debug, Error)]
pub enum RotationError {
    /// No safe address was found within the attempt ceiling; the caller may retry
    #[error("No safe exit address after {0} attempts")]
    AttemptsExhausted(u32),

    /// The safety authority could not be reached; rotation cannot continue
    #[error("Rotation authority unavailable: {0}")]
    AuthorityUnavailable(String),

    #[error("Tor control error: {0}")]
    Control(String),

    #[error("Exit address check failed: {0}")]
    AddressCheck(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RotationError {
    /// Returns true if the pipeline must stop instead of retrying the rotation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthorityUnavailable(_))
    }
}
