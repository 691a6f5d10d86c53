//! Route Port
//!
//! Routes are created and owned by route providers. The entrypoint only
//! holds shared references and reads them through this trait.

use crate::domain::ports::{HealthMonitor, HttpHandler};
use crate::domain::value_objects::{HealthStatus, RouteKind};
use std::sync::Arc;

/// A named, health-monitored destination.
pub trait Route: Send + Sync {
    /// Alias the route is registered under.
    fn name(&self) -> &str;

    /// Name of the provider that created the route.
    fn provider(&self) -> &str;

    fn kind(&self) -> RouteKind;

    /// Host part of the listen address; `None` uses the entrypoint default.
    fn listen_host(&self) -> Option<&str> {
        None
    }

    /// Explicit listen port. `None` (or 0) registers the route on both the
    /// default HTTP and HTTPS addresses.
    fn listen_port(&self) -> Option<u16> {
        None
    }

    /// Excluded routes are tracked but never served.
    fn should_exclude(&self) -> bool {
        false
    }

    fn health_monitor(&self) -> Option<Arc<dyn HealthMonitor>>;

    /// Handler for HTTP routes; stream routes have none.
    fn http_handler(&self) -> Option<Arc<dyn HttpHandler>>;

    fn health(&self) -> HealthStatus {
        self.health_monitor()
            .map(|m| m.status())
            .unwrap_or(HealthStatus::Unknown)
    }
}
