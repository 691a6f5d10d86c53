//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod health_checker;
pub mod shutdown;
pub mod task;

pub use health_checker::{
    HealthCheckConfig, HealthCheckResult, HealthCheckType, ProbeHealthMonitor, StaticHealth,
};
pub use shutdown::{shutdown_signal, ConnectionGuard, ShutdownController};
pub use task::Task;
