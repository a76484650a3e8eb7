//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::SessionAuthority;
use crate::config::LbConfig;
use crate::error::LbError;
use crate::registry::HostRegistry;
use crate::scrape::ScrapeOptions;
use crate::select::Selector;

/// Interval for emitting pool metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// TCP request timeout for the DNS listener.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodically emit pool metrics.
async fn metrics_loop(registry: HostRegistry, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                registry.emit_metrics();
                debug!(
                    registered = registry.len(),
                    active = registry.active_addresses().len(),
                    "emitted pool metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Tear down the poller tasks and propagate a startup error.
async fn abort_pollers(
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    err: LbError,
) -> Result<(), LbError> {
    error!("server startup failed, stopping pollers: {}", err);
    shutdown.cancel();
    futures::future::join_all(handles).await;
    Err(err)
}

/// DNS load balancer server.
pub struct LbServer {
    config: LbConfig,
    registry: HostRegistry,
}

impl LbServer {
    /// Create a new server: validates configuration and seeds the registry
    /// from the configured targets. Invalid configuration is a hard
    /// failure; the server never starts with one.
    pub fn new(config: LbConfig) -> Result<Self, LbError> {
        config.validate()?;

        let registry = HostRegistry::new();
        for addr in config.target_addresses()? {
            registry.add(addr);
        }

        Ok(Self { config, registry })
    }

    /// Get a reference to the host registry.
    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    /// Run the DNS server until the shutdown token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), LbError> {
        info!(
            listen_addr = %self.config.listen_addr,
            hostname = %self.config.hostname,
            domain = %self.config.domain,
            targets = self.registry.len(),
            metric = %self.config.scrape.metric,
            scrape_port = self.config.scrape.port,
            interval_secs = self.config.scrape.interval_secs,
            timeout_secs = self.config.scrape.timeout_secs,
            "starting session-dns server"
        );

        // Launch one poller per host before serving; early queries fall
        // back to the shuffled full pool until scrapes land.
        let poller_handles = self
            .registry
            .start_all(ScrapeOptions::from(&self.config.scrape), shutdown.clone())?;

        // Create authority and catalog
        let selector = Selector::new(self.registry.clone());
        let authority = match SessionAuthority::new(&self.config, selector) {
            Ok(authority) => authority,
            Err(err) => return abort_pollers(shutdown, poller_handles, err).await,
        };

        let mut catalog = Catalog::new();
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(authority.origin().clone(), vec![authority]);

        // Create server
        let mut server = ServerFuture::new(catalog);

        // Bind UDP. A bind failure must not leave the pollers running.
        let udp_socket = match UdpSocket::bind(self.config.listen_addr).await {
            Ok(socket) => socket,
            Err(err) => return abort_pollers(shutdown, poller_handles, err.into()).await,
        };
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = match TcpListener::bind(self.config.listen_addr).await {
            Ok(listener) => listener,
            Err(err) => return abort_pollers(shutdown, poller_handles, err.into()).await,
        };
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!(
            hostname = %self.config.hostname,
            domain = %self.config.domain,
            "DNS server ready to serve queries"
        );

        // Start metrics loop
        let metrics_registry = self.registry.clone();
        let metrics_shutdown = shutdown.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_registry, metrics_shutdown).await;
        });

        // Emit initial metrics
        self.registry.emit_metrics();

        // Run server until shutdown
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        // Stop pollers and the metrics loop
        shutdown.cancel();
        futures::future::join_all(poller_handles).await;
        let _ = metrics_handle.await;

        info!("session-dns server stopped");
        Ok(())
    }
}
