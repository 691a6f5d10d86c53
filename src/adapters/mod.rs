//! Adapters
//!
//! Inbound adapters accept traffic and management calls; outbound adapters
//! forward requests and record access logs.

pub mod inbound;
pub mod outbound;
