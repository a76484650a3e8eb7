//! Backend host registry: the set of known hosts, their latest telemetry,
//! and the derived active set.
//!
//! All mutable host state sits behind a single `RwLock` so that the many
//! poller tasks and the query path never observe a torn update. Each host
//! is written by exactly one poller, but reads happen concurrently from
//! the selector and from the metrics loop.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::LbError;
use crate::metrics;
use crate::scrape::{self, ScrapeOptions};

/// One backend endpoint and its latest known telemetry.
#[derive(Debug, Clone)]
pub struct Host {
    /// Network address identifying the backend; primary key.
    pub addr: IpAddr,
    /// Telemetry endpoint port, assigned once by [`HostRegistry::start_all`].
    pub port: u16,
    /// Last successfully scraped metric value.
    pub last_value: f64,
    /// Working load estimate: reset to `last_value` on every successful
    /// scrape, bumped by the selector in between.
    pub estimate: f64,
    /// Time of the last successful scrape. `None` means never scraped, so
    /// the first liveness check always fails.
    pub last_updated: Option<Instant>,
}

impl Host {
    fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            port: 0,
            last_value: 0.0,
            estimate: 0.0,
            last_updated: None,
        }
    }

    /// Whether the host was successfully scraped within the window.
    pub fn is_active(&self, window: Duration) -> bool {
        match self.last_updated {
            Some(updated) => updated.elapsed() < window,
            None => false,
        }
    }
}

/// Result of a liveness recomputation that changed active-set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    /// Host entered the active set.
    Activated,
    /// Host left the active set.
    Deactivated,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// addr -> Host. Populated at setup, never removed at runtime.
    hosts: HashMap<IpAddr, Host>,

    /// Addresses whose most recent liveness check passed. Always a subset
    /// of `hosts` keys.
    active: HashSet<IpAddr>,
}

/// Thread-safe registry of backend hosts.
#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl HostRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host. Idempotent: adding an address already present is a
    /// no-op and leaves the existing host untouched. Returns whether the
    /// host was newly added.
    pub fn add(&self, addr: IpAddr) -> bool {
        let mut inner = self.inner.write();
        if inner.hosts.contains_key(&addr) {
            return false;
        }
        debug!(host = %addr, "registered host");
        inner.hosts.insert(addr, Host::new(addr));
        true
    }

    /// Number of registered hosts.
    pub fn len(&self) -> usize {
        self.inner.read().hosts.len()
    }

    /// Whether the registry has no hosts.
    pub fn is_empty(&self) -> bool {
        self.inner.read().hosts.is_empty()
    }

    /// Snapshot of one host's state.
    pub fn host(&self, addr: IpAddr) -> Option<Host> {
        self.inner.read().hosts.get(&addr).cloned()
    }

    /// Every registered address, in no particular order. Used by the
    /// degraded fallback path.
    pub fn all_addresses(&self) -> Vec<IpAddr> {
        self.inner.read().hosts.keys().copied().collect()
    }

    /// Currently active addresses, in no particular order. Ordering is the
    /// selector's job.
    pub fn active_addresses(&self) -> Vec<IpAddr> {
        self.inner.read().active.iter().copied().collect()
    }

    /// Record a successful scrape: the estimate is re-seeded from the
    /// scraped value and the liveness timestamp advances to now.
    pub fn record_scrape(&self, addr: IpAddr, value: f64) {
        let mut inner = self.inner.write();
        if let Some(host) = inner.hosts.get_mut(&addr) {
            host.last_value = value;
            host.estimate = value;
            host.last_updated = Some(Instant::now());
        }
    }

    /// Recompute a host's liveness against the window and update active-set
    /// membership. Returns the transition if membership changed.
    pub fn update_liveness(&self, addr: IpAddr, window: Duration) -> Option<LivenessChange> {
        let mut inner = self.inner.write();
        let active = match inner.hosts.get(&addr) {
            Some(host) => host.is_active(window),
            None => return None,
        };
        if active {
            if inner.active.insert(addr) {
                return Some(LivenessChange::Activated);
            }
        } else if inner.active.remove(&addr) {
            return Some(LivenessChange::Deactivated);
        }
        None
    }

    /// Snapshot the active set ordered by ascending estimate and claim one
    /// unit of work on the least-loaded host. Returns `None` when no host
    /// is active. Ties are broken arbitrarily.
    ///
    /// The claim keeps repeated selections between scrape cycles from
    /// always favoring the same host; the next successful scrape resets
    /// the estimate to the measured value.
    pub(crate) fn claim_least_loaded(&self) -> Option<Vec<IpAddr>> {
        let mut inner = self.inner.write();
        if inner.active.is_empty() {
            return None;
        }

        let mut ranked: Vec<(IpAddr, f64)> = inner
            .active
            .iter()
            .map(|addr| (*addr, inner.hosts[addr].estimate))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let chosen = ranked[0].0;
        if let Some(host) = inner.hosts.get_mut(&chosen) {
            host.estimate += 1.0;
        }

        Some(ranked.into_iter().map(|(addr, _)| addr).collect())
    }

    /// Assign the scrape port to every registered host and launch one
    /// poller task per host. Call exactly once after all [`add`] calls.
    ///
    /// The returned handles complete once `shutdown` is cancelled.
    ///
    /// [`add`]: HostRegistry::add
    pub fn start_all(
        &self,
        options: ScrapeOptions,
        shutdown: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, LbError> {
        let client = reqwest::Client::builder()
            .timeout(scrape::REQUEST_TIMEOUT)
            .build()?;
        let options = Arc::new(options);

        let addrs: Vec<IpAddr> = {
            let mut inner = self.inner.write();
            for host in inner.hosts.values_mut() {
                host.port = options.port;
            }
            inner.hosts.keys().copied().collect()
        };

        let handles: Vec<JoinHandle<()>> = addrs
            .into_iter()
            .map(|addr| {
                tokio::spawn(scrape::poll_loop(
                    self.clone(),
                    client.clone(),
                    addr,
                    options.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(hosts = handles.len(), "started telemetry pollers");
        Ok(handles)
    }

    /// Emit current pool metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_pool_counts(inner.hosts.len(), inner.active.len());
    }
}
