//! Health Monitor Port
//!
//! Read-only view over the health of a route or backend server.

use crate::domain::value_objects::HealthStatus;
use std::time::Duration;

/// Reports the health of whatever it monitors.
///
/// Implementations may probe actively or derive their status from other
/// monitors; callers only read.
pub trait HealthMonitor: Send + Sync {
    fn status(&self) -> HealthStatus;

    /// Time since the monitored target became available.
    fn uptime(&self) -> Duration;

    /// Latency observed by the last check.
    fn latency(&self) -> Duration;

    /// Human readable detail about the last check.
    fn detail(&self) -> String;
}
