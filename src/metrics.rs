//! Metrics instrumentation for session-dns.
//!
//! All metrics are prefixed with `session_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::Unhandled => "unhandled",
    };

    counter!("session_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("session_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records successfully.
    Success,
    /// Name not served by this zone.
    NxDomain,
    /// Record type this server does not answer.
    Unhandled,
}

/// Record one scrape attempt against a backend host.
pub fn record_scrape(outcome: ScrapeOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        ScrapeOutcome::Success => "success",
        ScrapeOutcome::RequestFailed => "request_failed",
        ScrapeOutcome::MetricMissing => "metric_missing",
        ScrapeOutcome::Unsupported => "unsupported_type",
        ScrapeOutcome::ParseFailed => "parse_failed",
    };

    counter!("session_dns.scrape.count", "outcome" => outcome_str).increment(1);
    histogram!("session_dns.scrape.duration.seconds").record(duration.as_secs_f64());
}

/// Outcome of a scrape attempt.
#[derive(Debug, Clone, Copy)]
pub enum ScrapeOutcome {
    /// Metric fetched and parsed.
    Success,
    /// HTTP request failed (refused, timed out, bad status).
    RequestFailed,
    /// Exposition parsed but the named metric family was absent.
    MetricMissing,
    /// Metric family is neither a gauge nor a counter.
    Unsupported,
    /// Exposition body or sample value was malformed.
    ParseFailed,
}

/// Record a host joining or leaving the active set.
pub fn record_liveness_change(activated: bool) {
    let direction = if activated { "activated" } else { "deactivated" };
    counter!("session_dns.host.transition.count", "direction" => direction).increment(1);
}

/// Record pool sizes (call periodically or on change).
pub fn record_pool_counts(registered: usize, active: usize) {
    gauge!("session_dns.pool.registered.count").set(registered as f64);
    gauge!("session_dns.pool.active.count").set(active as f64);
}

/// Record one answer-set selection.
pub fn record_selection(mode: SelectionMode, answers: usize) {
    let mode_str = match mode {
        SelectionMode::Ranked => "ranked",
        SelectionMode::Degraded => "degraded",
    };

    counter!("session_dns.selection.count", "mode" => mode_str).increment(1);
    histogram!("session_dns.selection.answers").record(answers as f64);
}

/// How an answer set was produced.
#[derive(Debug, Clone, Copy)]
pub enum SelectionMode {
    /// Active hosts ordered by estimated load.
    Ranked,
    /// No active hosts; full pool shuffled.
    Degraded,
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
