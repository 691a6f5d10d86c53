//! Entrypoint
//!
//! Top-level coordinator: places routes into HTTP servers keyed by listen
//! address, tracks stream and excluded routes, and reports route health.

use crate::adapters::inbound::{same_route, HttpProto, HttpServer, TlsConfig};
use crate::application::dispatcher::Dispatcher;
use crate::domain::ports::{AccessLogger, HttpHandler, Middleware, Route};
use crate::domain::services::{DomainMatcher, ShortLinkMatcher};
use crate::domain::value_objects::{HealthStatus, RouteKind};
use crate::error::Result;
use crate::infrastructure::Task;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Settings the entrypoint is constructed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointConfig {
    pub listen_host: String,
    pub http_port: u16,
    pub https_port: u16,
    /// Empty matches any domain.
    pub match_domains: Vec<String>,
    pub short_link_host: String,
    pub short_link_default_domain: String,
    pub error_page_dir: Option<PathBuf>,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            http_port: 80,
            https_port: 443,
            match_domains: Vec::new(),
            short_link_host: "go".to_string(),
            short_link_default_domain: String::new(),
            error_page_dir: None,
        }
    }
}

impl EntrypointConfig {
    pub fn http_addr(&self) -> String {
        join_host_port(&self.listen_host, self.http_port)
    }

    pub fn https_addr(&self) -> String {
        join_host_port(&self.listen_host, self.https_port)
    }
}

pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Route counts by health status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub total: usize,
    pub healthy: usize,
    pub napping: usize,
    pub starting: usize,
    pub unhealthy: usize,
    pub error: usize,
    pub unknown: usize,
}

impl HealthCounts {
    fn add(&mut self, status: HealthStatus) {
        self.total += 1;
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Napping => self.napping += 1,
            HealthStatus::Starting => self.starting += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Error => self.error += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub total: usize,
    pub reverse_proxies: HealthCounts,
    pub streams: HealthCounts,
}

impl RouteStats {
    fn add(&mut self, kind: RouteKind, status: HealthStatus) {
        self.total += 1;
        match kind {
            RouteKind::Http => self.reverse_proxies.add(status),
            RouteKind::Stream => self.streams.add(status),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct StatsReport {
    pub overall: RouteStats,
    pub providers: BTreeMap<String, RouteStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub alias: String,
    pub provider: String,
    pub kind: RouteKind,
    pub status: HealthStatus,
    pub excluded: bool,
    /// Listen addresses serving the route.
    pub listen: Vec<String>,
}

pub struct Entrypoint {
    config: EntrypointConfig,
    dispatcher: Arc<Dispatcher>,
    tls: Option<TlsConfig>,
    servers: DashMap<String, Arc<HttpServer>>,
    http_routes: DashMap<String, Arc<dyn Route>>,
    stream_routes: DashMap<String, Arc<dyn Route>>,
    excluded_routes: DashMap<String, Arc<dyn Route>>,
}

impl Entrypoint {
    pub fn new(config: EntrypointConfig, tls: Option<TlsConfig>) -> Arc<Self> {
        let dispatcher = Dispatcher::new(config.short_link_host.clone());
        dispatcher.set_matcher(DomainMatcher::from_domains(&config.match_domains));
        dispatcher.set_error_page_dir(config.error_page_dir.clone());
        dispatcher
            .short_links()
            .set_default_domain_suffix(&config.short_link_default_domain);

        Arc::new(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            tls,
            servers: DashMap::new(),
            http_routes: DashMap::new(),
            stream_routes: DashMap::new(),
            excluded_routes: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EntrypointConfig {
        &self.config
    }

    pub fn short_links(&self) -> &Arc<ShortLinkMatcher> {
        self.dispatcher.short_links()
    }

    // ===== Reconfiguration =====

    pub fn set_match_domains(&self, domains: &[String]) {
        self.dispatcher.set_matcher(DomainMatcher::from_domains(domains));
    }

    pub fn set_middleware(&self, middleware: Option<Arc<dyn Middleware>>) {
        self.dispatcher.set_middleware(middleware);
    }

    pub fn set_access_logger(&self, logger: Option<Arc<dyn AccessLogger>>) {
        self.dispatcher.set_access_logger(logger);
    }

    pub fn set_not_found_handler(&self, handler: Option<Arc<dyn HttpHandler>>) {
        self.dispatcher.set_not_found_handler(handler);
    }

    pub fn set_short_link_default_domain(&self, domain: &str) {
        self.dispatcher.short_links().set_default_domain_suffix(domain);
    }

    // ===== Registration =====

    /// Register `route`.
    ///
    /// HTTP routes without a port go to the default HTTP address (and the
    /// HTTPS address when a certificate is configured); routes with a port
    /// go to that address only. Servers are started on first use. The
    /// route stays registered until the returned handle is cancelled.
    pub fn add_route(self: &Arc<Self>, route: Arc<dyn Route>) -> Result<RouteRegistration> {
        let name = route.name().to_string();

        if route.should_exclude() {
            self.excluded_routes.insert(name.clone(), route.clone());
            tracing::debug!("route {} is excluded", name);
            return Ok(self.registration(route, Placement::Excluded));
        }

        match route.kind() {
            RouteKind::Stream => {
                self.stream_routes.insert(name.clone(), route.clone());
                tracing::info!("added stream route {}", name);
                Ok(self.registration(route, Placement::Stream))
            }
            RouteKind::Http => {
                let mut placed: Vec<Arc<HttpServer>> = Vec::new();
                for (addr, proto) in self.listen_addrs(route.as_ref()) {
                    match self.server_for(&addr, proto) {
                        Ok(server) => {
                            server.add_route(route.clone());
                            placed.push(server);
                        }
                        Err(e) => {
                            for server in &placed {
                                server.del_route(&route);
                            }
                            return Err(e);
                        }
                    }
                }

                self.http_routes.insert(name.clone(), route.clone());
                self.dispatcher.short_links().add_route(&name);
                tracing::info!(
                    "added route {} on {}",
                    name,
                    placed.iter().map(|s| s.addr()).collect::<Vec<_>>().join(", ")
                );
                Ok(self.registration(route, Placement::Http(placed)))
            }
        }
    }

    fn registration(self: &Arc<Self>, route: Arc<dyn Route>, placement: Placement) -> RouteRegistration {
        RouteRegistration {
            entrypoint: Arc::downgrade(self),
            route,
            placement,
        }
    }

    fn listen_addrs(&self, route: &dyn Route) -> Vec<(String, HttpProto)> {
        let host = route
            .listen_host()
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.config.listen_host);

        match route.listen_port() {
            None | Some(0) => {
                let mut addrs = vec![(join_host_port(host, self.config.http_port), HttpProto::Http)];
                if self.tls.is_some() {
                    addrs.push((join_host_port(host, self.config.https_port), HttpProto::Https));
                }
                addrs
            }
            Some(port) => vec![(join_host_port(host, port), HttpProto::Https)],
        }
    }

    /// Server for `addr`, started exactly once. A failed listen leaves no
    /// entry behind.
    fn server_for(&self, addr: &str, proto: HttpProto) -> Result<Arc<HttpServer>> {
        match self.servers.entry(addr.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let tls = match proto {
                    HttpProto::Https => self.tls.clone(),
                    HttpProto::Http => None,
                };
                let server = HttpServer::listen(addr, proto, self.dispatcher.clone(), tls)?;
                entry.insert(server.clone());
                Ok(server)
            }
        }
    }

    fn remove_route(&self, route: &Arc<dyn Route>, placement: &Placement) {
        let name = route.name();
        let removed = match placement {
            Placement::Excluded => self
                .excluded_routes
                .remove_if(name, |_, r| same_route(r, route))
                .is_some(),
            Placement::Stream => self
                .stream_routes
                .remove_if(name, |_, r| same_route(r, route))
                .is_some(),
            Placement::Http(servers) => {
                for server in servers {
                    server.del_route(route);
                }
                let removed = self
                    .http_routes
                    .remove_if(name, |_, r| same_route(r, route))
                    .is_some();
                if removed {
                    self.dispatcher.short_links().del_route(name);
                }
                removed
            }
        };

        if removed {
            tracing::info!("removed route {}", name);
        }
    }

    // ===== Queries =====

    pub fn server(&self, addr: &str) -> Option<Arc<HttpServer>> {
        self.servers.get(addr).map(|s| s.value().clone())
    }

    pub fn servers(&self) -> Vec<Arc<HttpServer>> {
        let mut servers: Vec<Arc<HttpServer>> = self.servers.iter().map(|s| s.value().clone()).collect();
        servers.sort_by(|a, b| a.addr().cmp(b.addr()));
        servers
    }

    /// HTTP or stream route registered under `alias`.
    pub fn get_route(&self, alias: &str) -> Option<Arc<dyn Route>> {
        self.http_routes
            .get(alias)
            .or_else(|| self.stream_routes.get(alias))
            .map(|r| r.value().clone())
    }

    pub fn num_routes(&self) -> usize {
        self.http_routes.len() + self.stream_routes.len()
    }

    /// Names of every provider with at least one route, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut providers = BTreeSet::new();
        for pool in [&self.http_routes, &self.stream_routes, &self.excluded_routes] {
            for route in pool.iter() {
                providers.insert(route.provider().to_string());
            }
        }
        providers.into_iter().collect()
    }

    /// Health counts of served routes, overall and per provider.
    pub fn route_stats(&self) -> StatsReport {
        let mut report = StatsReport::default();
        for pool in [&self.http_routes, &self.stream_routes] {
            for route in pool.iter() {
                let (kind, status) = (route.kind(), route.health());
                report.overall.add(kind, status);
                report
                    .providers
                    .entry(route.provider().to_string())
                    .or_default()
                    .add(kind, status);
            }
        }
        report
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut infos = Vec::new();
        for (pool, excluded) in [
            (&self.http_routes, false),
            (&self.stream_routes, false),
            (&self.excluded_routes, true),
        ] {
            for route in pool.iter() {
                let listen = if route.kind() == RouteKind::Http && !excluded {
                    self.servers()
                        .into_iter()
                        .filter(|s| s.route_names().iter().any(|n| n == route.name()))
                        .map(|s| s.addr().to_string())
                        .collect()
                } else {
                    Vec::new()
                };
                infos.push(RouteInfo {
                    alias: route.name().to_string(),
                    provider: route.provider().to_string(),
                    kind: route.kind(),
                    status: route.health(),
                    excluded,
                    listen,
                });
            }
        }
        infos.sort_by(|a, b| a.alias.cmp(&b.alias));
        infos
    }

    /// Close every HTTP server, waiting up to `drain` for open connections.
    pub async fn shutdown(&self, drain: Duration) {
        let servers = self.servers();
        let closing: Vec<_> = servers
            .iter()
            .cloned()
            .map(|server| tokio::spawn(async move { server.close(drain).await }))
            .collect();

        let mut undrained = 0;
        for handle in closing {
            if !matches!(handle.await, Ok(true)) {
                undrained += 1;
            }
        }
        if undrained > 0 {
            tracing::warn!("{} servers closed with connections still open", undrained);
        }
        tracing::info!("entrypoint stopped ({} servers)", servers.len());
    }
}

enum Placement {
    Excluded,
    Stream,
    Http(Vec<Arc<HttpServer>>),
}

/// Handle to a registered route. Cancelling it removes the route from
/// every pool it was placed in. Dropping it leaves the route registered.
#[must_use = "a route stays registered until its registration is cancelled"]
pub struct RouteRegistration {
    entrypoint: Weak<Entrypoint>,
    route: Arc<dyn Route>,
    placement: Placement,
}

impl RouteRegistration {
    pub fn route(&self) -> &Arc<dyn Route> {
        &self.route
    }

    pub fn cancel(self) {
        if let Some(entrypoint) = self.entrypoint.upgrade() {
            entrypoint.remove_route(&self.route, &self.placement);
        }
    }

    /// Cancel the registration once `task` finishes.
    pub fn release_when_finished(self, task: Task) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let reason = task.finished().await;
            tracing::info!("releasing route {}: {}", self.route.name(), reason);
            self.cancel();
        })
    }
}

impl std::fmt::Debug for RouteRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistration")
            .field("route", &self.route.name())
            .finish()
    }
}
