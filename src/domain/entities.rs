//! Domain Entities - Core business objects
//!
//! Backend servers, the stock route implementations, and the request-scoped
//! state the dispatch layer attaches to each request.

use crate::domain::ports::{HealthMonitor, HttpHandler, HttpRequest, HttpResponse, Route};
use crate::domain::value_objects::{HealthStatus, RouteKind};
use crate::error::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A backend server behind a load balancer.
///
/// The handler and health monitor are shared with whoever created the server
/// and have their own lifecycles; the weight is owned by the load balancer
/// the server was added to and is only changed under its pool lock.
pub struct Server {
    name: String,
    key: String,
    url: String,
    weight: AtomicU32,
    handler: Arc<dyn HttpHandler>,
    health: Arc<dyn HealthMonitor>,
}

impl Server {
    /// Create a server whose pool key is its name.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        weight: u32,
        handler: Arc<dyn HttpHandler>,
        health: Arc<dyn HealthMonitor>,
    ) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            url: url.into(),
            weight: AtomicU32::new(weight),
            handler,
            health,
        }
    }

    /// Override the pool key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identity inside a load balancer pool.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn health_monitor(&self) -> &Arc<dyn HealthMonitor> {
        &self.health
    }

    pub async fn serve(&self, req: HttpRequest) -> HttpResponse {
        self.handler.serve(req).await
    }

    /// Wake the backend if its handler supports idling.
    pub async fn try_wake(&self) -> Result<()> {
        self.handler.try_wake().await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("url", &self.url)
            .field("weight", &self.weight())
            .field("status", &self.status())
            .finish()
    }
}

/// Peer information attached to every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    /// Whether the request arrived over TLS.
    pub tls: bool,
}

impl ConnectionInfo {
    pub fn from_request(req: &HttpRequest) -> Option<Self> {
        req.extensions().get::<Self>().copied()
    }
}

/// The route a request was dispatched to.
///
/// Only the HTTP server dispatch inserts this; handlers further down the
/// chain read it.
#[derive(Clone)]
pub struct RouteContext(pub Arc<dyn Route>);

impl RouteContext {
    pub fn from_request(req: &HttpRequest) -> Option<Arc<dyn Route>> {
        req.extensions().get::<Self>().map(|ctx| ctx.0.clone())
    }
}

/// A reverse proxy route backed by a single handler.
///
/// The handler may itself be a load balancer.
pub struct HttpRoute {
    name: String,
    provider: String,
    listen_host: Option<String>,
    listen_port: Option<u16>,
    excluded: bool,
    handler: Arc<dyn HttpHandler>,
    health: Option<Arc<dyn HealthMonitor>>,
}

impl HttpRoute {
    pub fn new(name: impl Into<String>, handler: Arc<dyn HttpHandler>) -> Self {
        Self {
            name: name.into(),
            provider: String::new(),
            listen_host: None,
            listen_port: None,
            excluded: false,
            handler,
            health: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = Some(host.into());
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn with_health(mut self, health: Arc<dyn HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

impl Route for HttpRoute {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn kind(&self) -> RouteKind {
        RouteKind::Http
    }

    fn listen_host(&self) -> Option<&str> {
        self.listen_host.as_deref()
    }

    fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    fn should_exclude(&self) -> bool {
        self.excluded
    }

    fn health_monitor(&self) -> Option<Arc<dyn HealthMonitor>> {
        self.health.clone()
    }

    fn http_handler(&self) -> Option<Arc<dyn HttpHandler>> {
        Some(self.handler.clone())
    }
}

/// A raw TCP/UDP route. Tracked for reporting; streams are not served by
/// the HTTP dispatch path.
pub struct StreamRoute {
    name: String,
    provider: String,
    target: String,
    health: Option<Arc<dyn HealthMonitor>>,
}

impl StreamRoute {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: String::new(),
            target: target.into(),
            health: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_health(mut self, health: Arc<dyn HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Route for StreamRoute {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn kind(&self) -> RouteKind {
        RouteKind::Stream
    }

    fn health_monitor(&self) -> Option<Arc<dyn HealthMonitor>> {
        self.health.clone()
    }

    fn http_handler(&self) -> Option<Arc<dyn HttpHandler>> {
        None
    }
}
