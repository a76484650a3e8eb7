//! Answer-set selection over the host registry.

use rand::seq::SliceRandom;
use std::net::IpAddr;
use tracing::debug;

use crate::metrics::{self, SelectionMode};
use crate::registry::HostRegistry;

/// Produces the ordered address list for one DNS answer.
#[derive(Debug, Clone)]
pub struct Selector {
    registry: HostRegistry,
}

impl Selector {
    /// Create a selector over the given registry.
    pub fn new(registry: HostRegistry) -> Self {
        Self { registry }
    }

    /// Addresses for one answer, best candidates first.
    ///
    /// When hosts are active this is the active set ordered by ascending
    /// load estimate, with one unit of work claimed on the least-loaded
    /// host as a side effect. When no host is active every registered
    /// address is returned in a fresh random order, so even without live
    /// telemetry the load is spread probabilistically instead of always
    /// hitting the same entry.
    ///
    /// Never blocks on I/O; this only reads and writes in-memory state.
    pub fn addresses(&self) -> Vec<IpAddr> {
        if let Some(ranked) = self.registry.claim_least_loaded() {
            metrics::record_selection(SelectionMode::Ranked, ranked.len());
            return ranked;
        }

        let mut all = self.registry.all_addresses();
        all.shuffle(&mut rand::thread_rng());
        debug!(
            hosts = all.len(),
            "no active hosts, answering with shuffled full pool"
        );
        metrics::record_selection(SelectionMode::Degraded, all.len());
        all
    }
}
