//! Route Gateway Library
//!
//! Host-based HTTP routing, load balancing and short links, exposed for
//! integration tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{ApiServer, HttpProto, HttpServer, TlsConfig};
pub use adapters::outbound::{ReverseProxy, TracingAccessLogger};
pub use application::{Entrypoint, EntrypointConfig, RouteRegistration};
pub use config::load_config;
pub use domain::entities::{HttpRoute, Server, StreamRoute};
pub use domain::ports::{HealthMonitor, HttpHandler, Middleware, Route};
pub use domain::services::{LoadBalancer, LoadBalancerConfig, ShortLinkMatcher};
pub use domain::value_objects::{HealthStatus, LoadBalanceMode};
pub use error::{GatewayError, Result};
