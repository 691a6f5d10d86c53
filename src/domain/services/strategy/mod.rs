//! Backend selection strategies
//!
//! A load balancer delegates the choice of backend to exactly one strategy,
//! picked once from its mode. Strategies that need request-level side
//! effects override `serve`.

mod ip_hash;
mod least_conn;
mod round_robin;

pub use ip_hash::IpHash;
pub use least_conn::LeastConn;
pub use round_robin::RoundRobin;

use crate::domain::entities::Server;
use crate::domain::ports::{HttpRequest, HttpResponse};
use crate::domain::value_objects::LoadBalanceMode;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Contract shared by all selection algorithms.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn mode(&self) -> LoadBalanceMode;

    /// Pick a server for `req` out of the healthy candidates.
    fn choose_server(&self, servers: &[Arc<Server>], req: &HttpRequest) -> Option<Arc<Server>>;

    fn on_add_server(&self, _srv: &Arc<Server>) {}

    fn on_remove_server(&self, _srv: &Arc<Server>) {}

    /// Serve `req` with the chosen server.
    async fn serve(&self, srv: Arc<Server>, req: HttpRequest) -> HttpResponse {
        srv.serve(req).await
    }
}

/// Build the strategy for `mode`. An unset mode is round robin.
pub fn new_strategy(mode: LoadBalanceMode, options: &Map<String, Value>) -> Arc<dyn Strategy> {
    match mode {
        LoadBalanceMode::Unset | LoadBalanceMode::RoundRobin => Arc::new(RoundRobin::new()),
        LoadBalanceMode::LeastConn => Arc::new(LeastConn::new()),
        LoadBalanceMode::IpHash => Arc::new(IpHash::from_options(options)),
    }
}
