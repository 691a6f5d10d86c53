//! Application Layer
//!
//! Request dispatch and route registration across HTTP servers.

pub mod dispatcher;
pub mod entrypoint;
pub mod middleware;

pub use dispatcher::{request_host, Dispatcher, RoutePool};
pub use entrypoint::{
    join_host_port, Entrypoint, EntrypointConfig, HealthCounts, RouteInfo, RouteRegistration,
    RouteStats, StatsReport,
};
pub use middleware::MiddlewareChain;
