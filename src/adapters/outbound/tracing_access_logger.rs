//! Tracing Access Logger
//!
//! Writes access log entries as `tracing` events under the `access_log`
//! target, so they can be filtered or routed separately from application
//! logs.

use crate::domain::ports::{AccessLogEntry, AccessLogger};

pub const ACCESS_LOG_TARGET: &str = "access_log";

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAccessLogger;

impl TracingAccessLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AccessLogger for TracingAccessLogger {
    fn log(&self, entry: &AccessLogEntry) {
        let remote = entry
            .remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        let route = entry.route.as_deref().unwrap_or("-");

        tracing::info!(
            target: ACCESS_LOG_TARGET,
            "{} {} {} {} {} route={} {}ms",
            remote,
            entry.method,
            entry.host,
            entry.path,
            entry.status,
            route,
            entry.duration.as_millis()
        );
    }
}
