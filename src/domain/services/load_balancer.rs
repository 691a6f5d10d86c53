//! Load Balancer Service
//!
//! A pool of backend servers behind one route. Selection is delegated to a
//! [`Strategy`] chosen once from the configured mode; the balancer itself
//! owns pool membership, weight normalization, health gating and sticky
//! sessions.

use crate::domain::entities::Server;
use crate::domain::ports::{error_response, HealthMonitor, HttpHandler, HttpRequest, HttpResponse};
use crate::domain::services::sticky::{is_secure, server_from_cookie, set_sticky_cookie};
use crate::domain::services::strategy::{new_strategy, Strategy};
use crate::domain::value_objects::{HealthStatus, LoadBalanceMode};
use crate::infrastructure::Task;
use async_trait::async_trait;
use dashmap::DashMap;
use http::StatusCode;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sum every pool's weights are normalized to.
pub const TARGET_WEIGHT_SUM: u32 = 100;

/// Requests carrying this header wake every idle candidate before dispatch.
pub const CHECK_REDIRECT_HEADER: &str = "x-godoxy-check-redirect";

const DEFAULT_STICKY_MAX_AGE_SECS: u64 = 3600;

/// Load balancer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    /// Name of the route this balancer serves.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub mode: LoadBalanceMode,
    #[serde(default)]
    pub sticky: bool,
    /// Sticky cookie lifetime; 0 means one hour.
    #[serde(default)]
    pub sticky_max_age_secs: u64,
    /// Strategy specific options.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl LoadBalancerConfig {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Default::default()
        }
    }

    pub fn sticky_max_age(&self) -> Duration {
        match self.sticky_max_age_secs {
            0 => Duration::from_secs(DEFAULT_STICKY_MAX_AGE_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// Current weight of one pool member, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServerWeight {
    pub key: String,
    pub name: String,
    pub weight: u32,
    pub status: HealthStatus,
}

pub struct LoadBalancer {
    config: RwLock<LoadBalancerConfig>,
    pool: DashMap<String, Arc<Server>>,
    /// Serializes pool mutation; holds the current weight sum. Kept wide so
    /// arbitrary `u32` weights cannot overflow it.
    pool_lock: Mutex<u64>,
    strategy: RwLock<Arc<dyn Strategy>>,
    started_at: Instant,
    task: Task,
}

impl LoadBalancer {
    pub fn new(config: LoadBalancerConfig) -> Self {
        let strategy = new_strategy(config.mode, &config.options);
        let task = Task::new(format!("load_balancer:{}", config.link));
        Self {
            config: RwLock::new(config),
            pool: DashMap::new(),
            pool_lock: Mutex::new(0),
            strategy: RwLock::new(strategy),
            started_at: Instant::now(),
            task,
        }
    }

    pub fn config(&self) -> LoadBalancerConfig {
        self.config.read().clone()
    }

    pub fn link(&self) -> String {
        self.config.read().link.clone()
    }

    /// Active selection mode.
    pub fn mode(&self) -> LoadBalanceMode {
        self.strategy.read().mode()
    }

    /// Finishes with "no server left" when the last server is removed.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Apply a configuration update.
    ///
    /// The mode can only be set once: the first non-empty mode replaces the
    /// strategy, later ones are ignored.
    pub fn update_config(&self, new: LoadBalancerConfig) {
        let _guard = self.pool_lock.lock();
        let mut config = self.config.write();

        if config.link.is_empty() {
            config.link = new.link.clone();
        }

        if !new.mode.is_unset() {
            if config.mode.is_unset() {
                config.mode = new.mode;
                config.options = new.options.clone();
                let strategy = new_strategy(new.mode, &config.options);
                for srv in self.sorted_servers() {
                    strategy.on_add_server(&srv);
                }
                *self.strategy.write() = strategy;
                tracing::info!("load balancer {}: mode set to {}", config.link, new.mode);
            } else if config.mode != new.mode {
                tracing::warn!(
                    "load balancer {}: mode is already {}, ignoring {}",
                    config.link,
                    config.mode,
                    new.mode
                );
            }
        }

        config.sticky = new.sticky;
        config.sticky_max_age_secs = new.sticky_max_age_secs;
    }

    /// Add a server, replacing any server with the same key.
    pub fn add_server(&self, srv: Arc<Server>) {
        let mut sum = self.pool_lock.lock();
        let strategy = self.strategy.read().clone();

        if let Some((_, old)) = self.pool.remove(srv.key()) {
            *sum = sum.saturating_sub(u64::from(old.weight()));
            strategy.on_remove_server(&old);
        }

        *sum += u64::from(srv.weight());
        self.pool.insert(srv.key().to_string(), srv.clone());
        self.rebalance(&mut sum);
        strategy.on_add_server(&srv);

        tracing::debug!(
            "load balancer {}: added server {} ({} total)",
            self.link(),
            srv.name(),
            self.pool.len()
        );
    }

    /// Remove the server with `key`. Removing the last server finishes the
    /// balancer's task.
    pub fn remove_server(&self, key: &str) -> Option<Arc<Server>> {
        let mut sum = self.pool_lock.lock();
        let (_, srv) = self.pool.remove(key)?;

        *sum = sum.saturating_sub(u64::from(srv.weight()));
        self.rebalance(&mut sum);
        self.strategy.read().on_remove_server(&srv);

        tracing::debug!(
            "load balancer {}: removed server {} ({} left)",
            self.link(),
            srv.name(),
            self.pool.len()
        );

        if self.pool.is_empty() {
            *sum = 0;
            self.task.finish("no server left");
        }
        Some(srv)
    }

    /// Normalize weights so they add up to [`TARGET_WEIGHT_SUM`]. Caller
    /// holds the pool lock.
    fn rebalance(&self, sum: &mut u64) {
        if *sum == u64::from(TARGET_WEIGHT_SUM) || self.pool.is_empty() {
            return;
        }

        let servers = self.sorted_servers();
        let n = servers.len() as u32;

        if *sum == 0 {
            let base = TARGET_WEIGHT_SUM / n;
            let extra = (TARGET_WEIGHT_SUM % n) as usize;
            for (i, srv) in servers.iter().enumerate() {
                srv.set_weight(base + u32::from(i < extra));
            }
            *sum = u64::from(TARGET_WEIGHT_SUM);
            return;
        }

        let old_sum = *sum;
        let mut new_sum: i64 = 0;
        for srv in &servers {
            let scaled = u64::from(srv.weight()) * u64::from(TARGET_WEIGHT_SUM) / old_sum;
            srv.set_weight(scaled as u32);
            new_sum += scaled as i64;
        }

        let mut diff = i64::from(TARGET_WEIGHT_SUM) - new_sum;
        let mut i = 0;
        while diff != 0 {
            let srv = &servers[i % servers.len()];
            if diff > 0 {
                srv.set_weight(srv.weight() + 1);
                diff -= 1;
            } else if srv.weight() > 0 {
                srv.set_weight(srv.weight() - 1);
                diff += 1;
            }
            i += 1;
        }

        *sum = u64::from(TARGET_WEIGHT_SUM);
    }

    fn sorted_servers(&self) -> Vec<Arc<Server>> {
        let mut servers: Vec<Arc<Server>> = self.pool.iter().map(|e| e.value().clone()).collect();
        servers.sort_by(|a, b| a.key().cmp(b.key()));
        servers
    }

    /// Every server in the pool, ordered by key.
    pub fn servers(&self) -> Vec<Arc<Server>> {
        self.sorted_servers()
    }

    /// Healthy servers, ordered by key. Recomputed on every call.
    pub fn available_servers(&self) -> Vec<Arc<Server>> {
        let mut servers = self.sorted_servers();
        servers.retain(|srv| srv.status().good());
        servers
    }

    pub fn server_weights(&self) -> Vec<ServerWeight> {
        self.sorted_servers()
            .into_iter()
            .map(|srv| ServerWeight {
                key: srv.key().to_string(),
                name: srv.name().to_string(),
                weight: srv.weight(),
                status: srv.status(),
            })
            .collect()
    }

    pub fn sum_weight(&self) -> u64 {
        *self.pool_lock.lock()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("link", &self.link())
            .field("mode", &self.mode())
            .field("servers", &self.pool.len())
            .finish()
    }
}

#[async_trait]
impl HttpHandler for LoadBalancer {
    async fn serve(&self, req: HttpRequest) -> HttpResponse {
        let servers = self.available_servers();
        if servers.is_empty() {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "no server available");
        }

        if req.headers().contains_key(CHECK_REDIRECT_HEADER) {
            for srv in &servers {
                if let Err(e) = srv.try_wake().await {
                    tracing::warn!("failed to wake server {}: {}", srv.name(), e);
                }
            }
        }

        let strategy = self.strategy.read().clone();
        let (sticky, max_age) = {
            let config = self.config.read();
            (config.sticky, config.sticky_max_age())
        };

        if sticky {
            if let Some(srv) = server_from_cookie(&req, &servers) {
                return strategy.serve(srv, req).await;
            }
        }

        let Some(srv) = strategy.choose_server(&servers, &req) else {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "no server available");
        };

        let secure = is_secure(&req);
        let mut resp = strategy.serve(srv.clone(), req).await;
        if sticky {
            set_sticky_cookie(&mut resp, &srv, max_age, secure);
        }
        resp
    }

    async fn try_wake(&self) -> crate::error::Result<()> {
        let mut first_err = None;
        for srv in self.servers() {
            if let Err(e) = srv.try_wake().await {
                tracing::warn!("failed to wake server {}: {}", srv.name(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl HealthMonitor for LoadBalancer {
    fn status(&self) -> HealthStatus {
        if self.pool.is_empty() {
            return HealthStatus::Unknown;
        }
        if self.pool.iter().any(|srv| srv.status().good()) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn latency(&self) -> Duration {
        let good = self.available_servers();
        if good.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = good.iter().map(|srv| srv.health_monitor().latency()).sum();
        total / good.len() as u32
    }

    fn detail(&self) -> String {
        format!(
            "{}/{} servers healthy",
            self.available_servers().len(),
            self.pool.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::sticky::{sticky_id, STICKY_COOKIE_NAME};
    use crate::domain::services::strategy::testing::{request, server, server_with, Named};
    use crate::error::GatewayError;
    use crate::infrastructure::StaticHealth;
    use axum::body::to_bytes;
    use http::header::{COOKIE, SET_COOKIE};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn balancer(mode: LoadBalanceMode) -> LoadBalancer {
        LoadBalancer::new(LoadBalancerConfig {
            link: "app".to_string(),
            mode,
            ..Default::default()
        })
    }

    fn weights(lb: &LoadBalancer) -> Vec<u32> {
        lb.servers().iter().map(|s| s.weight()).collect()
    }

    async fn body_of(resp: HttpResponse) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ===== Rebalance Tests =====

    #[test]
    fn test_rebalance_unweighted_even_split() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server("x"));
        assert_eq!(weights(&lb), vec![100]);

        // sum is already on target, newcomers keep their zero weight
        for key in ["a", "b", "c"] {
            lb.add_server(server(key));
        }
        assert_eq!(weights(&lb), vec![0, 0, 0, 100]);

        lb.remove_server("x");
        assert_eq!(weights(&lb), vec![34, 33, 33]);
        assert_eq!(lb.sum_weight(), u64::from(TARGET_WEIGHT_SUM));
    }

    #[test]
    fn test_rebalance_scales_weights() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server_with("a", 30, HealthStatus::Healthy));
        assert_eq!(weights(&lb), vec![100]);

        lb.add_server(server_with("b", 100, HealthStatus::Healthy));
        assert_eq!(weights(&lb), vec![50, 50]);

        // 50 + 50 + 50 scaled by 100/150 truncates to 99, residual goes to the first
        lb.add_server(server_with("c", 50, HealthStatus::Healthy));
        assert_eq!(weights(&lb), vec![34, 33, 33]);
    }

    #[test]
    fn test_rebalance_invariant_across_mutations() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        let plan: [(&str, u32); 6] = [("a", 0), ("b", 7), ("c", 13), ("d", 0), ("e", 250), ("f", 1)];

        for (key, weight) in plan {
            lb.add_server(server_with(key, weight, HealthStatus::Healthy));
            assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
        }
        for key in ["b", "e", "a"] {
            lb.remove_server(key);
            assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
            assert_eq!(lb.sum_weight(), u64::from(TARGET_WEIGHT_SUM));
        }
    }

    #[test]
    fn test_rebalance_extreme_weights() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server_with("a", u32::MAX, HealthStatus::Healthy));
        assert_eq!(weights(&lb), vec![100]);

        // 100 + u32::MAX scales to 0 and 99, residual goes to the first
        lb.add_server(server_with("b", u32::MAX, HealthStatus::Healthy));
        assert_eq!(weights(&lb), vec![1, 99]);
        assert_eq!(lb.sum_weight(), u64::from(TARGET_WEIGHT_SUM));

        lb.add_server(server_with("c", u32::MAX, HealthStatus::Healthy));
        assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
        assert_eq!(lb.sum_weight(), u64::from(TARGET_WEIGHT_SUM));

        lb.remove_server("a");
        assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
    }

    #[test]
    fn test_rebalance_concurrent_mutations() {
        let lb = Arc::new(balancer(LoadBalanceMode::RoundRobin));
        lb.add_server(server_with("anchor", 10, HealthStatus::Healthy));

        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let lb = lb.clone();
                scope.spawn(move || {
                    for i in 0..50u32 {
                        let key = format!("t{}-{}", t, i % 5);
                        lb.add_server(server_with(&key, i * 37 + t, HealthStatus::Healthy));
                        if i % 3 == 0 {
                            lb.remove_server(&key);
                        }
                    }
                });
            }
        });

        assert!(!lb.is_empty());
        assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
        assert_eq!(lb.sum_weight(), u64::from(TARGET_WEIGHT_SUM));
    }

    #[test]
    fn test_add_server_replaces_same_key() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server("a"));
        lb.add_server(server("b"));
        lb.add_server(server("a"));

        assert_eq!(lb.len(), 2);
        assert_eq!(weights(&lb).iter().sum::<u32>(), TARGET_WEIGHT_SUM);
    }

    #[test]
    fn test_remove_last_server_finishes_task() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server("a"));
        lb.add_server(server("b"));

        assert!(lb.remove_server("a").is_some());
        assert!(!lb.task().is_finished());
        assert!(lb.remove_server("missing").is_none());

        lb.remove_server("b");
        assert!(lb.is_empty());
        assert_eq!(lb.task().reason().as_deref(), Some("no server left"));
    }

    // ===== Config Tests =====

    #[test]
    fn test_mode_is_immutable_once_set() {
        let lb = LoadBalancer::new(LoadBalancerConfig::new("app"));
        lb.add_server(server("a"));
        assert_eq!(lb.mode(), LoadBalanceMode::RoundRobin);

        lb.update_config(LoadBalancerConfig {
            mode: LoadBalanceMode::LeastConn,
            ..Default::default()
        });
        assert_eq!(lb.mode(), LoadBalanceMode::LeastConn);

        lb.update_config(LoadBalancerConfig {
            mode: LoadBalanceMode::IpHash,
            ..Default::default()
        });
        assert_eq!(lb.mode(), LoadBalanceMode::LeastConn);

        lb.update_config(LoadBalancerConfig::default());
        assert_eq!(lb.mode(), LoadBalanceMode::LeastConn);
        assert_eq!(lb.link(), "app");
    }

    #[tokio::test]
    async fn test_mode_switch_registers_existing_servers() {
        let lb = LoadBalancer::new(LoadBalancerConfig::new("app"));
        lb.add_server(server("a"));
        lb.update_config(LoadBalancerConfig {
            mode: LoadBalanceMode::LeastConn,
            ..Default::default()
        });

        // least conn would answer 500 if "a" had no counter
        let resp = lb.serve(request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_sticky_max_age_default() {
        assert_eq!(LoadBalancerConfig::default().sticky_max_age(), Duration::from_secs(3600));
        let cfg = LoadBalancerConfig {
            sticky_max_age_secs: 60,
            ..Default::default()
        };
        assert_eq!(cfg.sticky_max_age(), Duration::from_secs(60));
    }

    // ===== Serve Tests =====

    #[tokio::test]
    async fn test_serve_all_bad_is_unavailable() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server_with("a", 0, HealthStatus::Unhealthy));
        lb.add_server(server_with("b", 0, HealthStatus::Error));

        let resp = lb.serve(request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_serve_skips_bad_servers() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server_with("a", 0, HealthStatus::Unhealthy));
        lb.add_server(server("b"));

        for _ in 0..4 {
            assert_eq!(body_of(lb.serve(request()).await).await, "b");
        }
    }

    #[tokio::test]
    async fn test_serve_idle_servers_are_candidates() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server_with("a", 0, HealthStatus::Napping));

        assert_eq!(lb.serve(request()).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sticky_sets_cookie_and_pins_server() {
        let lb = LoadBalancer::new(LoadBalancerConfig {
            link: "app".to_string(),
            sticky: true,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            lb.add_server(server(key));
        }

        let resp = lb.serve(request()).await;
        let cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
        let first = body_of(resp).await;
        let pair = cookie.split(';').next().unwrap().to_string();

        for _ in 0..5 {
            let req = http::Request::builder()
                .header(COOKIE, pair.as_str())
                .body(axum::body::Body::empty())
                .unwrap();
            assert_eq!(body_of(lb.serve(req).await).await, first);
        }
    }

    #[tokio::test]
    async fn test_sticky_cookie_for_unavailable_server_is_ignored() {
        let lb = LoadBalancer::new(LoadBalancerConfig {
            link: "app".to_string(),
            sticky: true,
            ..Default::default()
        });
        let down = server_with("a", 0, HealthStatus::Unhealthy);
        lb.add_server(down.clone());
        lb.add_server(server("b"));

        let req = http::Request::builder()
            .header(COOKIE, format!("{}={}", STICKY_COOKIE_NAME, sticky_id(&down)))
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(body_of(lb.serve(req).await).await, "b");
    }

    struct Sleepy {
        woken: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl HttpHandler for Sleepy {
        async fn serve(&self, _req: HttpRequest) -> HttpResponse {
            http::Response::new(axum::body::Body::empty())
        }

        async fn try_wake(&self) -> crate::error::Result<()> {
            self.woken.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::Wake {
                    server: "sleepy".to_string(),
                    reason: "still asleep".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_check_redirect_header_wakes_candidates() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        let woken = Arc::new(AtomicUsize::new(0));
        for (key, fail) in [("a", false), ("b", true)] {
            lb.add_server(Arc::new(Server::new(
                key,
                "http://sleepy",
                0,
                Arc::new(Sleepy {
                    woken: woken.clone(),
                    fail,
                }),
                Arc::new(StaticHealth::new(HealthStatus::Napping)),
            )));
        }

        lb.serve(request()).await;
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        let req = http::Request::builder()
            .header(CHECK_REDIRECT_HEADER, "1")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = lb.serve(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(woken.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_try_wake_wakes_every_server() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        let woken = Arc::new(AtomicUsize::new(0));
        for (key, fail) in [("a", true), ("b", false), ("c", true)] {
            lb.add_server(Arc::new(Server::new(
                key,
                "http://sleepy",
                0,
                Arc::new(Sleepy {
                    woken: woken.clone(),
                    fail,
                }),
                Arc::new(StaticHealth::new(HealthStatus::Napping)),
            )));
        }

        let err = lb.try_wake().await.unwrap_err();
        assert!(matches!(err, GatewayError::Wake { .. }));
        assert_eq!(woken.load(Ordering::SeqCst), 3);
        assert!(logs_contain("failed to wake server"));
    }

    // ===== Health Monitor Tests =====

    #[test]
    fn test_health_monitor() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        assert_eq!(lb.status(), HealthStatus::Unknown);

        let health = Arc::new(StaticHealth::new(HealthStatus::Unhealthy));
        lb.add_server(Arc::new(Server::new(
            "a",
            "http://a",
            0,
            Arc::new(Named("a".to_string())),
            health.clone(),
        )));
        lb.add_server(server_with("b", 0, HealthStatus::Error));
        assert_eq!(lb.status(), HealthStatus::Unhealthy);
        assert_eq!(lb.detail(), "0/2 servers healthy");

        health.set_status(HealthStatus::Healthy);
        assert_eq!(lb.status(), HealthStatus::Healthy);
        assert_eq!(lb.detail(), "1/2 servers healthy");
    }

    #[test]
    fn test_server_weights_report() {
        let lb = balancer(LoadBalanceMode::RoundRobin);
        lb.add_server(server("b"));
        lb.add_server(server("a"));

        let report = lb.server_weights();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].key, "a");
        assert_eq!(report[0].weight + report[1].weight, TARGET_WEIGHT_SUM);
    }
}
