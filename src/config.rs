//! Configuration types for session-dns.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::error::LbError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Load balancer configuration.
    pub lb: LbConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Load balancer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Hostname label answered by this server (e.g., "api" for
    /// `api.example.com`).
    pub hostname: String,

    /// Domain the hostname lives under. Empty matches any domain.
    #[serde(default)]
    pub domain: String,

    /// TTL for answer records in seconds. Kept low so clients re-query and
    /// pick up load shifts quickly.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Backend pool: single IP addresses and/or CIDR prefixes.
    pub targets: Vec<String>,

    /// Telemetry scrape configuration.
    pub scrape: ScrapeConfig,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,
}

/// Telemetry scrape configuration for the backend pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Name of the metric family supplying the load value (gauge or counter).
    pub metric: String,

    /// Port every host exposes its `/metrics` endpoint on.
    pub port: u16,

    /// Poll cycle period in seconds.
    #[serde(default = "default_scrape_interval")]
    pub interval_secs: u64,

    /// Liveness window in seconds: a host is inactive if it has not been
    /// updated within this many seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
}

impl LbConfig {
    /// Validate configuration invariants that cannot be expressed in types.
    pub fn validate(&self) -> Result<(), LbError> {
        if self.hostname.is_empty() {
            return Err(LbError::Config("hostname must not be empty".into()));
        }
        if self.hostname.contains('.') {
            return Err(LbError::Config(
                "hostname must be a single label; put the rest in `domain`".into(),
            ));
        }
        if self.targets.is_empty() {
            return Err(LbError::Config("at least one target is required".into()));
        }
        if self.scrape.metric.is_empty() {
            return Err(LbError::Config("scrape.metric must not be empty".into()));
        }
        if self.scrape.port == 0 {
            return Err(LbError::Config("scrape.port must not be zero".into()));
        }
        if self.scrape.interval_secs == 0 {
            return Err(LbError::Config("scrape.interval_secs must not be zero".into()));
        }
        if self.scrape.timeout_secs == 0 {
            return Err(LbError::Config("scrape.timeout_secs must not be zero".into()));
        }
        Ok(())
    }

    /// Expand the configured targets into individual addresses.
    pub fn target_addresses(&self) -> Result<Vec<IpAddr>, LbError> {
        parse_targets(&self.targets)
    }
}

/// Parse target specs into addresses. Each spec is either a single IP
/// address or a CIDR prefix, which is expanded to its host addresses
/// (network and broadcast addresses are excluded).
pub fn parse_targets(specs: &[String]) -> Result<Vec<IpAddr>, LbError> {
    let mut addrs = Vec::new();
    for spec in specs {
        if let Ok(addr) = spec.parse::<IpAddr>() {
            addrs.push(addr);
            continue;
        }
        let net: ipnet::IpNet = spec
            .parse()
            .map_err(|_| LbError::InvalidAddress(spec.clone()))?;
        addrs.extend(net.hosts());
    }
    Ok(addrs)
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "session_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname (e.g., "ns1.example.com").
    pub mname: String,

    /// Admin email in DNS format (e.g., "admin.example.com" for admin@example.com).
    pub rname: String,

    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,

    /// Minimum TTL in seconds.
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

fn default_ttl() -> u32 {
    1
}

fn default_scrape_interval() -> u64 {
    15
}

fn default_scrape_timeout() -> u64 {
    30
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    60
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: "ns1.example.com".to_string(),
            rname: "admin.example.com".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> LbConfig {
        LbConfig {
            listen_addr: "127.0.0.1:5353".parse().unwrap(),
            hostname: "api".to_string(),
            domain: "example.com".to_string(),
            ttl: 1,
            targets: vec!["10.0.0.1".to_string()],
            scrape: ScrapeConfig {
                metric: "tcp_sessions".to_string(),
                port: 9100,
                interval_secs: 15,
                timeout_secs: 30,
            },
            soa: SoaConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        let mut config = base_config();
        config.hostname = String::new();
        assert!(matches!(config.validate(), Err(LbError::Config(_))));
    }

    #[test]
    fn test_dotted_hostname_rejected() {
        let mut config = base_config();
        config.hostname = "api.example.com".to_string();
        assert!(matches!(config.validate(), Err(LbError::Config(_))));
    }

    #[test]
    fn test_empty_targets_rejected() {
        let mut config = base_config();
        config.targets.clear();
        assert!(matches!(config.validate(), Err(LbError::Config(_))));
    }

    #[test]
    fn test_zero_scrape_port_rejected() {
        let mut config = base_config();
        config.scrape.port = 0;
        assert!(matches!(config.validate(), Err(LbError::Config(_))));
    }

    #[test]
    fn test_parse_single_address() {
        let addrs = parse_targets(&["10.0.0.1".to_string()]).unwrap();
        assert_eq!(addrs, vec!["10.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_parse_ipv6_address() {
        let addrs = parse_targets(&["fd00::1".to_string()]).unwrap();
        assert_eq!(addrs, vec!["fd00::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_parse_cidr_expands_hosts() {
        let addrs = parse_targets(&["192.168.1.0/30".to_string()]).unwrap();
        // /30 has two usable host addresses.
        assert_eq!(
            addrs,
            vec![
                "192.168.1.1".parse::<IpAddr>().unwrap(),
                "192.168.1.2".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_mixed_specs() {
        let addrs =
            parse_targets(&["10.0.0.1".to_string(), "192.168.1.0/30".to_string()]).unwrap();
        assert_eq!(addrs.len(), 3);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let result = parse_targets(&["not-an-address".to_string()]);
        assert!(matches!(result, Err(LbError::InvalidAddress(_))));
    }
}
