//! Bounded memory of exit addresses already used

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;

/// How long used addresses are remembered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep the most recent `n` addresses, evicting the oldest
    Bounded(usize),

    /// Never evict; an address is never reused within a run
    RetainAll,
}

impl Retention {
    /// Maps a configured reuse threshold; 0 means retain all
    pub fn from_threshold(threshold: usize) -> Self {
        if threshold == 0 {
            Self::RetainAll
        } else {
            Self::Bounded(threshold)
        }
    }
}

/// Insertion-ordered set of used exit addresses
#[derive(Debug, Clone)]
pub struct UsedIpSet {
    order: VecDeque<IpAddr>,
    members: HashSet<IpAddr>,
    retention: Retention,
}

impl UsedIpSet {
    pub fn new(retention: Retention) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            retention,
        }
    }

    pub fn contains(&self, address: &IpAddr) -> bool {
        self.members.contains(address)
    }

    /// Records an address, evicting the oldest one if over capacity
    ///
    /// Re-inserting a member is a no-op.
    pub fn insert(&mut self, address: IpAddr) {
        if !self.members.insert(address) {
            return;
        }
        self.order.push_back(address);

        if let Retention::Bounded(capacity) = self.retention {
            while self.order.len() > capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.members.remove(&evicted);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
