//! session-dns - A DNS load balancer driven by live backend telemetry.
//!
//! This crate provides an authoritative DNS server that answers address
//! queries for one configured hostname by ordering the backend pool by
//! estimated load. Load estimates come from Prometheus metrics scraped
//! from every backend on a fixed interval; between scrapes, each answered
//! query claims one unit of work on the host it put first.
//!
//! ## Features
//!
//! - One background poller per backend host, fully decoupled from serving
//! - Time-windowed liveness: hosts drop out of rotation when their
//!   telemetry goes stale
//! - Availability-first degraded mode: with zero live hosts, queries get
//!   the full pool in random order instead of an error
//! - Graceful shutdown via a cancellation token
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         session-dns                            │
//! │                                                                │
//! │  ┌──────────────────┐      ┌──────────────────┐               │
//! │  │ Pollers (1/host) │─────▶│  Host Registry   │               │
//! │  │ GET /metrics     │      │  (in-memory)     │               │
//! │  └──────────────────┘      └────────┬─────────┘               │
//! │                                     │                          │
//! │                                     ▼                          │
//! │                            ┌──────────────────┐               │
//! │                            │ Selector         │               │
//! │                            │ least-estimated  │               │
//! │                            └────────┬─────────┘               │
//! │                                     │                          │
//! │                            ┌────────▼─────────┐               │
//! │                            │  Hickory DNS     │◀── UDP/TCP    │
//! │                            │  Server          │    :53        │
//! │                            └──────────────────┘               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use session_dns::{LbConfig, LbServer, ScrapeConfig, SoaConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LbConfig {
//!         listen_addr: "0.0.0.0:5353".parse().unwrap(),
//!         hostname: "api".to_string(),
//!         domain: "example.com".to_string(),
//!         ttl: 1,
//!         targets: vec!["10.0.0.0/28".to_string()],
//!         scrape: ScrapeConfig {
//!             metric: "tcp_sessions".to_string(),
//!             port: 9100,
//!             interval_secs: 15,
//!             timeout_secs: 30,
//!         },
//!         soa: SoaConfig::default(),
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let server = LbServer::new(config).unwrap();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod scrape;
pub mod select;
pub mod server;
pub mod telemetry;

// Re-export main types
pub use config::{Config, LbConfig, ScrapeConfig, SoaConfig, TelemetryConfig};
pub use error::LbError;
pub use registry::{Host, HostRegistry, LivenessChange};
pub use scrape::ScrapeOptions;
pub use select::Selector;
pub use server::LbServer;
