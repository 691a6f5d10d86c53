use super::Strategy;
use crate::domain::entities::Server;
use crate::domain::ports::{error_response, HttpRequest, HttpResponse};
use crate::domain::value_objects::LoadBalanceMode;
use async_trait::async_trait;
use dashmap::DashMap;
use http::StatusCode;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Picks the server with the fewest requests in flight.
#[derive(Debug, Default)]
pub struct LeastConn {
    connections: DashMap<String, Arc<AtomicI64>>,
}

impl LeastConn {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-flight requests of the server with `key`.
    pub fn connections(&self, key: &str) -> Option<i64> {
        self.connections.get(key).map(|c| c.load(Ordering::Relaxed))
    }
}

struct InFlight(Arc<AtomicI64>);

impl InFlight {
    fn start(counter: Arc<AtomicI64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Strategy for LeastConn {
    fn mode(&self) -> LoadBalanceMode {
        LoadBalanceMode::LeastConn
    }

    fn choose_server(&self, servers: &[Arc<Server>], _req: &HttpRequest) -> Option<Arc<Server>> {
        let mut best: Option<(&Arc<Server>, i64)> = None;

        for srv in servers {
            let Some(count) = self.connections(srv.key()) else {
                tracing::error!("least conn: server {} has no connection counter", srv.name());
                continue;
            };
            match best {
                Some((_, min)) if count >= min => {}
                _ => best = Some((srv, count)),
            }
        }

        // no counters at all: serve answers 500 for the fallback
        best.map(|(srv, _)| srv).or_else(|| servers.first()).cloned()
    }

    fn on_add_server(&self, srv: &Arc<Server>) {
        self.connections
            .insert(srv.key().to_string(), Arc::new(AtomicI64::new(0)));
    }

    fn on_remove_server(&self, srv: &Arc<Server>) {
        self.connections.remove(srv.key());
    }

    async fn serve(&self, srv: Arc<Server>, req: HttpRequest) -> HttpResponse {
        let Some(counter) = self.connections.get(srv.key()).map(|c| c.value().clone()) else {
            tracing::error!(
                "least conn: server {} missing from connection table, bookkeeping bug",
                srv.name()
            );
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        };

        let _in_flight = InFlight::start(counter);
        srv.serve(req).await
    }
}
