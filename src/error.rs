//! Gateway errors
//!
//! Errors surfaced to whoever triggered an operation (usually route
//! registration). Exhaustion conditions during request handling are not
//! errors; they are answered with an HTTP status instead.

use std::io;

/// Error type shared by the gateway library.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("failed to wake server {server}: {reason}")]
    Wake { server: String, reason: String },

    #[error("invalid upstream url {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_error_message() {
        let err = GatewayError::Listen {
            addr: "0.0.0.0:80".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to listen on 0.0.0.0:80: address in use"
        );
    }

    #[test]
    fn test_wake_error_message() {
        let err = GatewayError::Wake {
            server: "app-1".to_string(),
            reason: "container not found".to_string(),
        };
        assert_eq!(err.to_string(), "failed to wake server app-1: container not found");
    }
}
