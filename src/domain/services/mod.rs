//! Domain Services
//!
//! Routing and load balancing logic with no transport concerns.

pub mod domain_matcher;
pub mod load_balancer;
pub mod real_ip;
pub mod short_link;
pub mod sticky;
pub mod strategy;

pub use domain_matcher::DomainMatcher;
pub use load_balancer::{LoadBalancer, LoadBalancerConfig, ServerWeight};
pub use short_link::ShortLinkMatcher;
pub use strategy::Strategy;
