use super::Strategy;
use crate::domain::entities::{ConnectionInfo, Server};
use crate::domain::ports::HttpRequest;
use crate::domain::services::real_ip::{RealIpConfig, RealIpResolver};
use crate::domain::services::sticky::hash64;
use crate::domain::value_objects::LoadBalanceMode;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;

/// Maps each client address to a fixed position in its own server list.
///
/// The list follows add/remove notifications rather than the per-request
/// healthy snapshot, so a client keeps its server while the pool is stable.
pub struct IpHash {
    servers: RwLock<Vec<Arc<Server>>>,
    real_ip: Option<RealIpResolver>,
}

impl IpHash {
    pub fn new(real_ip: Option<RealIpResolver>) -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
            real_ip,
        }
    }

    /// Build from load balancer options. Any option enables header based
    /// client IP resolution; invalid options are logged and ignored.
    pub fn from_options(options: &Map<String, Value>) -> Self {
        if options.is_empty() {
            return Self::new(None);
        }
        match serde_json::from_value::<RealIpConfig>(Value::Object(options.clone())) {
            Ok(config) => Self::new(Some(RealIpResolver::new(config))),
            Err(e) => {
                tracing::warn!("ip hash: invalid real ip options, using peer address: {}", e);
                Self::new(None)
            }
        }
    }

    fn client_ip(&self, req: &HttpRequest) -> Option<IpAddr> {
        let resolved = self.real_ip.as_ref().and_then(|r| r.resolve(req));
        resolved.or_else(|| ConnectionInfo::from_request(req).map(|info| info.remote_addr.ip()))
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Strategy for IpHash {
    fn mode(&self) -> LoadBalanceMode {
        LoadBalanceMode::IpHash
    }

    fn choose_server(&self, _servers: &[Arc<Server>], req: &HttpRequest) -> Option<Arc<Server>> {
        let Some(ip) = self.client_ip(req) else {
            tracing::warn!("ip hash: cannot determine client address");
            return None;
        };

        let servers = self.servers.read();
        if servers.is_empty() {
            return None;
        }

        let idx = hash64(ip.to_string().as_bytes()) % servers.len() as u64;
        let srv = &servers[idx as usize];
        if srv.status().bad() {
            tracing::debug!("ip hash: {} maps to unavailable server {}", ip, srv.name());
            return None;
        }
        Some(srv.clone())
    }

    fn on_add_server(&self, srv: &Arc<Server>) {
        let mut servers = self.servers.write();
        match servers.iter_mut().find(|s| s.key() == srv.key()) {
            Some(existing) => *existing = srv.clone(),
            None => servers.push(srv.clone()),
        }
    }

    fn on_remove_server(&self, srv: &Arc<Server>) {
        self.servers.write().retain(|s| s.key() != srv.key());
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{server, server_with};
    use super::*;
    use crate::domain::value_objects::HealthStatus;
    use axum::body::Body;
    use std::net::SocketAddr;

    fn request_from(peer: &str) -> HttpRequest {
        let mut req = http::Request::new(Body::empty());
        req.extensions_mut().insert(ConnectionInfo {
            remote_addr: peer.parse::<SocketAddr>().unwrap(),
            tls: false,
        });
        req
    }

    #[test]
    fn test_ip_hash_is_stable_per_client() {
        let ih = IpHash::new(None);
        for key in ["a", "b", "c"] {
            ih.on_add_server(&server(key));
        }

        let first = ih.choose_server(&[], &request_from("203.0.113.5:1000")).unwrap();
        for port in 1001..1010 {
            let again = ih
                .choose_server(&[], &request_from(&format!("203.0.113.5:{}", port)))
                .unwrap();
            assert_eq!(again.key(), first.key());
        }
    }

    #[test]
    fn test_ip_hash_uses_private_list() {
        let ih = IpHash::new(None);
        ih.on_add_server(&server("a"));

        // candidate list passed in is ignored
        let chosen = ih
            .choose_server(&[server("zzz")], &request_from("10.0.0.1:1"))
            .unwrap();
        assert_eq!(chosen.key(), "a");
    }

    #[test]
    fn test_ip_hash_add_replaces_same_key() {
        let ih = IpHash::new(None);
        ih.on_add_server(&server("a"));
        ih.on_add_server(&server("a"));
        assert_eq!(ih.len(), 1);

        ih.on_remove_server(&server("a"));
        assert!(ih.is_empty());
    }

    #[test]
    fn test_ip_hash_unhealthy_target() {
        let ih = IpHash::new(None);
        ih.on_add_server(&server_with("a", 0, HealthStatus::Unhealthy));
        assert!(ih.choose_server(&[], &request_from("10.0.0.1:1")).is_none());
    }

    #[test]
    fn test_ip_hash_without_client_address() {
        let ih = IpHash::new(None);
        ih.on_add_server(&server("a"));
        assert!(ih.choose_server(&[], &http::Request::new(Body::empty())).is_none());
    }

    #[test]
    fn test_ip_hash_real_ip_header() {
        let mut options = Map::new();
        options.insert("header".to_string(), Value::from("X-Forwarded-For"));
        options.insert("from".to_string(), serde_json::json!(["127.0.0.1"]));
        let ih = IpHash::from_options(&options);

        let mut req = request_from("127.0.0.1:4000");
        req.headers_mut()
            .insert("X-Forwarded-For", "198.51.100.20".parse().unwrap());
        assert_eq!(ih.client_ip(&req), Some("198.51.100.20".parse().unwrap()));
    }

    #[test]
    fn test_ip_hash_invalid_options_fall_back() {
        let mut options = Map::new();
        options.insert("recursive".to_string(), Value::from("yes please"));
        let ih = IpHash::from_options(&options);
        assert!(ih.real_ip.is_none());
    }
}
