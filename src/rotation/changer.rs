//! The rotation protocol

use crate::rotation::{ExitNetwork, RotationError, SafetyCheck};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Provides a fresh, never-used exit address on demand
#[async_trait]
pub trait IpRotator: Send + Sync {
    async fn get_new_ip(&self) -> Result<IpAddr, RotationError>;
}

/// Renews the exit circuit until the safety check accepts the new address
///
/// Every attempt renews the circuit, waits `settle` for the new circuit to be
/// used, reads the current exit address and asks the safety check about it.
/// A failed renewal or an unanswered address check consumes an attempt.
pub struct IpChanger<N, S> {
    network: N,
    safety: S,
    real_address: Option<IpAddr>,
    max_attempts: u32,
    settle: Duration,
}

impl<N: ExitNetwork, S: SafetyCheck> IpChanger<N, S> {
    /// Creates a rotator
    ///
    /// # Arguments
    ///
    /// * `network` - The anonymizing network
    /// * `safety` - Local or remote safety authority
    /// * `max_attempts` - Attempt ceiling for one rotation
    /// * `settle` - Pause between renewal and address check
    pub fn new(network: N, safety: S, max_attempts: u32, settle: Duration) -> Self {
        Self {
            network,
            safety,
            real_address: None,
            max_attempts,
            settle,
        }
    }

    /// Rejects this address locally before consulting the safety check
    ///
    /// Distributed workers run on hosts whose real address the central
    /// authority does not know.
    pub fn with_real_address(mut self, real_address: IpAddr) -> Self {
        self.real_address = Some(real_address);
        self
    }
}

#[async_trait]
impl<N: ExitNetwork, S: SafetyCheck> IpRotator for IpChanger<N, S> {
    async fn get_new_ip(&self) -> Result<IpAddr, RotationError> {
        for attempt in 1..=self.max_attempts {
            if let Err(e) = self.network.renew_exit_circuit().await {
                tracing::warn!("Circuit renewal failed (attempt {}): {}", attempt, e);
                tokio::time::sleep(self.settle).await;
                continue;
            }
            tokio::time::sleep(self.settle).await;

            let candidate = match self.network.current_exit_address().await {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!("Exit address check failed (attempt {}): {}", attempt, e);
                    continue;
                }
            };

            if Some(candidate) == self.real_address {
                tracing::warn!("Exit address {} is the real address, renewing", candidate);
                continue;
            }

            match self.safety.check_and_record(candidate).await {
                Ok(true) => {
                    tracing::info!("New exit address {} ({} attempts)", candidate, attempt);
                    return Ok(candidate);
                }
                Ok(false) => {
                    tracing::debug!("Exit address {} already used, renewing", candidate);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Safety check failed for {}: {}", candidate, e);
                }
            }
        }

        Err(RotationError::AttemptsExhausted(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::{IpAuthority, LocalSafety, Retention};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Exit network replaying a fixed script of addresses
    struct ScriptedNetwork {
        addresses: Mutex<VecDeque<Result<IpAddr, RotationError>>>,
        renewals: AtomicUsize,
    }

    impl ScriptedNetwork {
        fn new(addresses: Vec<Result<IpAddr, RotationError>>) -> Self {
            Self {
                addresses: Mutex::new(addresses.into()),
                renewals: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExitNetwork for ScriptedNetwork {
        async fn renew_exit_circuit(&self) -> Result<(), RotationError> {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn current_exit_address(&self) -> Result<IpAddr, RotationError> {
            self.addresses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RotationError::AddressCheck("script ended".into())))
        }
    }

    struct UnreachableAuthority;

    #[async_trait]
    impl SafetyCheck for UnreachableAuthority {
        async fn check_and_record(&self, _candidate: IpAddr) -> Result<bool, RotationError> {
            Err(RotationError::AuthorityUnavailable("connection refused".into()))
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn local(real: IpAddr) -> (Arc<IpAuthority>, LocalSafety) {
        let authority = Arc::new(IpAuthority::new(real, Retention::RetainAll));
        let safety = LocalSafety::new(Arc::clone(&authority));
        (authority, safety)
    }

    #[tokio::test]
    async fn test_skips_used_and_real_addresses() {
        let (authority, safety) = local(ip(1));
        authority.record_used(ip(2));
        let network = ScriptedNetwork::new(vec![Ok(ip(1)), Ok(ip(2)), Ok(ip(3))]);

        let changer = IpChanger::new(network, safety, 10, Duration::ZERO);

        assert_eq!(changer.get_new_ip().await.unwrap(), ip(3));
        assert_eq!(changer.network.renewals.load(Ordering::SeqCst), 3);
        assert!(!authority.is_safe(ip(3)));
    }

    #[tokio::test]
    async fn test_failed_address_check_consumes_attempt() {
        let (_, safety) = local(ip(1));
        let network = ScriptedNetwork::new(vec![
            Err(RotationError::AddressCheck("timeout".into())),
            Ok(ip(5)),
        ]);

        let changer = IpChanger::new(network, safety, 2, Duration::ZERO);

        assert_eq!(changer.get_new_ip().await.unwrap(), ip(5));
    }

    #[tokio::test]
    async fn test_attempt_ceiling() {
        let (_, safety) = local(ip(1));
        let network = ScriptedNetwork::new(vec![Ok(ip(1)), Ok(ip(1)), Ok(ip(1)), Ok(ip(9))]);

        let changer = IpChanger::new(network, safety, 3, Duration::ZERO);

        let err = changer.get_new_ip().await.unwrap_err();
        assert!(matches!(err, RotationError::AttemptsExhausted(3)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_local_real_address_guard() {
        let (_, safety) = local(ip(1));
        let network = ScriptedNetwork::new(vec![Ok(ip(200)), Ok(ip(4))]);

        let changer =
            IpChanger::new(network, safety, 5, Duration::ZERO).with_real_address(ip(200));

        assert_eq!(changer.get_new_ip().await.unwrap(), ip(4));
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_fatal() {
        let network = ScriptedNetwork::new(vec![Ok(ip(4))]);

        let changer = IpChanger::new(network, UnreachableAuthority, 5, Duration::ZERO);

        let err = changer.get_new_ip().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
