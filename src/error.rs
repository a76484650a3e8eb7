//! Error types for session-dns.

use thiserror::Error;

/// Errors that can occur while setting up or running the server.
#[derive(Debug, Error)]
pub enum LbError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error (scrape client construction)
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Failed to parse a target address or CIDR prefix
    #[error("Invalid target address: {0}")]
    InvalidAddress(String),
}
