use super::Strategy;
use crate::domain::entities::Server;
use crate::domain::ports::HttpRequest;
use crate::domain::value_objects::LoadBalanceMode;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Cycles through the candidates with a shared counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: AtomicU32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for RoundRobin {
    fn mode(&self) -> LoadBalanceMode {
        LoadBalanceMode::RoundRobin
    }

    fn choose_server(&self, servers: &[Arc<Server>], _req: &HttpRequest) -> Option<Arc<Server>> {
        if servers.is_empty() {
            return None;
        }
        let n = servers.len() as u32;
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % n;
        // only the remainder matters; keep the counter bounded
        if self.index.load(Ordering::Relaxed) >= n.saturating_mul(2) {
            self.index.store(0, Ordering::Relaxed);
        }
        servers.get(idx as usize).cloned()
    }
}
