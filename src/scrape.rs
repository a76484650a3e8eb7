//! Telemetry scraping: fetch a host's Prometheus exposition document and
//! run the per-host poll loop that drives liveness.
//!
//! Every scrape failure is contained here: it is logged, counted, and the
//! host's previous state is left stale. The next scheduled cycle is the
//! retry.

use reqwest::Client;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::metrics::{self, ScrapeOutcome};
use crate::registry::{HostRegistry, LivenessChange};

/// Per-request timeout for one telemetry fetch. Kept well below the default
/// poll interval so a hung backend can never starve its poller.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime scrape parameters shared by all pollers.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Metric family name supplying the load value.
    pub metric: String,
    /// Telemetry port on every host.
    pub port: u16,
    /// Poll cycle period.
    pub interval: Duration,
    /// Liveness window.
    pub window: Duration,
}

impl From<&ScrapeConfig> for ScrapeOptions {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            metric: config.metric.clone(),
            port: config.port,
            interval: Duration::from_secs(config.interval_secs),
            window: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Errors from one scrape attempt. Never propagated out of the poll loop.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The HTTP request failed (refused, timed out, non-2xx status).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The named metric family is absent from the exposition document.
    #[error("metric {0:?} not found in exposition")]
    MissingMetric(String),

    /// The metric family is neither a gauge nor a counter.
    #[error("unsupported type {kind:?} for metric {metric:?}")]
    UnsupportedType {
        /// Metric family name.
        metric: String,
        /// Declared exposition type.
        kind: String,
    },

    /// The sample line for the metric was malformed.
    #[error("malformed sample for metric {metric:?}: {reason}")]
    Parse {
        /// Metric family name.
        metric: String,
        /// What was wrong with the sample.
        reason: String,
    },
}

impl ScrapeError {
    fn outcome(&self) -> ScrapeOutcome {
        match self {
            ScrapeError::Request(_) => ScrapeOutcome::RequestFailed,
            ScrapeError::MissingMetric(_) => ScrapeOutcome::MetricMissing,
            ScrapeError::UnsupportedType { .. } => ScrapeOutcome::Unsupported,
            ScrapeError::Parse { .. } => ScrapeOutcome::ParseFailed,
        }
    }
}

fn metrics_url(addr: IpAddr, port: u16) -> String {
    match addr {
        IpAddr::V4(v4) => format!("http://{v4}:{port}/metrics"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}/metrics"),
    }
}

/// Fetch a host's exposition document and extract the named metric value.
pub async fn fetch_metric(
    client: &Client,
    addr: IpAddr,
    port: u16,
    metric: &str,
) -> Result<f64, ScrapeError> {
    let url = metrics_url(addr, port);
    let body = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    extract_metric_value(&body, metric)
}

/// Extract the first sample value of the named metric family from a text
/// exposition document.
///
/// Only gauges and counters are supported; both reduce to "the first
/// sample's numeric value" here. A family without a `# TYPE` line counts
/// as untyped and is rejected. Label sets are skipped, not interpreted
/// (label values containing a literal `}` are not handled).
pub fn extract_metric_value(body: &str, metric: &str) -> Result<f64, ScrapeError> {
    let mut kind: Option<&str> = None;
    let mut sample: Option<&str> = None;

    for line in body.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            let mut parts = rest.split_whitespace();
            if parts.next() == Some(metric) {
                kind = parts.next();
            }
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if sample.is_none() {
            if let Some(rest) = line.strip_prefix(metric) {
                if rest.starts_with('{') || rest.starts_with(' ') || rest.starts_with('\t') {
                    sample = Some(line);
                }
            }
        }
    }

    let sample = sample.ok_or_else(|| ScrapeError::MissingMetric(metric.to_string()))?;

    match kind {
        Some("gauge") | Some("counter") => {}
        Some(other) => {
            return Err(ScrapeError::UnsupportedType {
                metric: metric.to_string(),
                kind: other.to_string(),
            })
        }
        None => {
            return Err(ScrapeError::UnsupportedType {
                metric: metric.to_string(),
                kind: "untyped".to_string(),
            })
        }
    }

    let after_labels = match sample.rfind('}') {
        Some(idx) => &sample[idx + 1..],
        None => &sample[metric.len()..],
    };
    let value_str = after_labels
        .split_whitespace()
        .next()
        .ok_or_else(|| ScrapeError::Parse {
            metric: metric.to_string(),
            reason: "missing sample value".to_string(),
        })?;

    value_str.parse::<f64>().map_err(|_| ScrapeError::Parse {
        metric: metric.to_string(),
        reason: format!("not a number: {value_str:?}"),
    })
}

/// Poll one host until the shutdown token fires.
///
/// Each cycle: fetch the metric, update registry state on success, then
/// recompute liveness and sleep out the remainder of the interval. A fetch
/// that overruns the interval triggers an immediate next cycle.
pub(crate) async fn poll_loop(
    registry: HostRegistry,
    client: Client,
    addr: IpAddr,
    options: Arc<ScrapeOptions>,
    shutdown: CancellationToken,
) {
    debug!(host = %addr, port = options.port, metric = %options.metric, "poller starting");

    loop {
        let start = Instant::now();

        match fetch_metric(&client, addr, options.port, &options.metric).await {
            Ok(value) => {
                debug!(host = %addr, value, "scraped metric");
                registry.record_scrape(addr, value);
                metrics::record_scrape(ScrapeOutcome::Success, start.elapsed());
            }
            Err(err) => {
                warn!(host = %addr, error = %err, "scrape failed, keeping previous state");
                metrics::record_scrape(err.outcome(), start.elapsed());
            }
        }

        match registry.update_liveness(addr, options.window) {
            Some(LivenessChange::Activated) => {
                info!(host = %addr, "host joined active set");
                metrics::record_liveness_change(true);
            }
            Some(LivenessChange::Deactivated) => {
                info!(host = %addr, "host left active set");
                metrics::record_liveness_change(false);
            }
            None => {}
        }

        let idle = options.interval.saturating_sub(start.elapsed());
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(host = %addr, "poller shutting down");
                return;
            }
            _ = tokio::time::sleep(idle) => {}
        }
    }
}
