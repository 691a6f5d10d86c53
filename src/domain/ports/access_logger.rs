//! Access Logger Port

use std::net::SocketAddr;
use std::time::Duration;

/// One served request.
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub method: String,
    pub host: String,
    pub path: String,
    pub status: u16,
    pub remote_addr: Option<SocketAddr>,
    pub route: Option<String>,
    pub duration: Duration,
}

/// Sink for access log entries.
pub trait AccessLogger: Send + Sync {
    fn log(&self, entry: &AccessLogEntry);
}
