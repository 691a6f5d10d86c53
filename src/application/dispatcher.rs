//! Request dispatch
//!
//! Settings shared by every HTTP server of an entrypoint, and the request
//! flow each server runs: match a route by host, run it through the
//! middleware, otherwise fall back to short links, the not-found handler,
//! the error page and finally a plain 404.

use crate::domain::entities::{ConnectionInfo, RouteContext};
use crate::domain::ports::{
    error_response, AccessLogEntry, AccessLogger, HttpHandler, HttpRequest, HttpResponse,
    Middleware, Route,
};
use crate::domain::services::domain_matcher::split_host_port;
use crate::domain::services::{DomainMatcher, ShortLinkMatcher};
use axum::body::Body;
use dashmap::DashMap;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderValue, StatusCode};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Routes served by one HTTP server, keyed by alias.
pub type RoutePool = DashMap<String, Arc<dyn Route>>;

pub const NOT_FOUND_PAGE: &str = "404.html";

/// Status logged when the client goes away before a response exists.
const CLIENT_CLOSED_REQUEST: u16 = 499;

pub struct Dispatcher {
    matcher: RwLock<DomainMatcher>,
    middleware: RwLock<Option<Arc<dyn Middleware>>>,
    access_logger: RwLock<Option<Arc<dyn AccessLogger>>>,
    not_found: RwLock<Option<Arc<dyn HttpHandler>>>,
    error_page_dir: RwLock<Option<PathBuf>>,
    short_links: Arc<ShortLinkMatcher>,
    short_link_host: String,
}

impl Dispatcher {
    pub fn new(short_link_host: impl Into<String>) -> Self {
        Self {
            matcher: RwLock::new(DomainMatcher::AnyDomain),
            middleware: RwLock::new(None),
            access_logger: RwLock::new(None),
            not_found: RwLock::new(None),
            error_page_dir: RwLock::new(None),
            short_links: Arc::new(ShortLinkMatcher::new()),
            short_link_host: short_link_host.into(),
        }
    }

    pub fn short_links(&self) -> &Arc<ShortLinkMatcher> {
        &self.short_links
    }

    pub fn short_link_host(&self) -> &str {
        &self.short_link_host
    }

    pub fn matcher(&self) -> DomainMatcher {
        self.matcher.read().clone()
    }

    pub fn set_matcher(&self, matcher: DomainMatcher) {
        *self.matcher.write() = matcher;
    }

    pub fn set_middleware(&self, middleware: Option<Arc<dyn Middleware>>) {
        *self.middleware.write() = middleware;
    }

    pub fn set_access_logger(&self, logger: Option<Arc<dyn AccessLogger>>) {
        *self.access_logger.write() = logger;
    }

    pub fn set_not_found_handler(&self, handler: Option<Arc<dyn HttpHandler>>) {
        *self.not_found.write() = handler;
    }

    pub fn set_error_page_dir(&self, dir: Option<PathBuf>) {
        *self.error_page_dir.write() = dir;
    }

    /// Route for `host` in `routes`.
    pub fn find_route(&self, routes: &RoutePool, host: &str) -> Option<Arc<dyn Route>> {
        self.matcher
            .read()
            .find(host, |alias| routes.get(alias).map(|r| r.value().clone()))
    }

    pub async fn dispatch(&self, routes: &RoutePool, req: HttpRequest) -> HttpResponse {
        let host = request_host(&req);
        let mut log = AccessLog::start(self.access_logger.read().clone(), &host, &req);

        let resp = match self.find_route(routes, &host) {
            Some(route) => {
                log.route(route.name());
                self.serve_route(route, req).await
            }
            None => self.serve_unmatched(&host, req).await,
        };

        log.status(resp.status());
        resp
    }

    async fn serve_route(&self, route: Arc<dyn Route>, mut req: HttpRequest) -> HttpResponse {
        let Some(handler) = route.http_handler() else {
            tracing::error!("route {} has no http handler", route.name());
            return error_response(StatusCode::NOT_FOUND, "404 not found");
        };

        tracing::debug!("dispatching {} {} to route {}", req.method(), req.uri(), route.name());
        req.extensions_mut().insert(RouteContext(route));

        let middleware = self.middleware.read().clone();
        match middleware {
            Some(middleware) => middleware.serve(handler.as_ref(), req).await,
            None => handler.serve(req).await,
        }
    }

    async fn serve_unmatched(&self, host: &str, req: HttpRequest) -> HttpResponse {
        let (hostname, _) = split_host_port(host);
        if !self.short_link_host.is_empty() && hostname.eq_ignore_ascii_case(&self.short_link_host) {
            return self.short_links.serve(req).await;
        }

        let not_found = self.not_found.read().clone();
        if let Some(handler) = not_found {
            return handler.serve(req).await;
        }

        let page_dir = self.error_page_dir.read().clone();
        if let Some(dir) = page_dir {
            match tokio::fs::read(dir.join(NOT_FOUND_PAGE)).await {
                Ok(page) => {
                    let mut resp = http::Response::new(Body::from(page));
                    *resp.status_mut() = StatusCode::NOT_FOUND;
                    resp.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/html; charset=utf-8"),
                    );
                    return resp;
                }
                Err(e) => tracing::debug!("no error page in {}: {}", dir.display(), e),
            }
        }

        tracing::error!("no route for host {:?} ({} {})", host, req.method(), req.uri());
        error_response(StatusCode::NOT_FOUND, "404 not found")
    }
}

/// `Host` header, or the URI authority for absolute-form requests.
pub fn request_host(req: &HttpRequest) -> String {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Emits one access log entry when dropped.
struct AccessLog {
    logger: Option<Arc<dyn AccessLogger>>,
    entry: AccessLogEntry,
    started: Instant,
}

impl AccessLog {
    fn start(logger: Option<Arc<dyn AccessLogger>>, host: &str, req: &HttpRequest) -> Self {
        let entry = AccessLogEntry {
            method: req.method().to_string(),
            host: host.to_string(),
            path: req
                .uri()
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "/".to_string()),
            status: CLIENT_CLOSED_REQUEST,
            remote_addr: ConnectionInfo::from_request(req).map(|info| info.remote_addr),
            route: None,
            duration: Default::default(),
        };
        Self {
            logger,
            entry,
            started: Instant::now(),
        }
    }

    fn route(&mut self, name: &str) {
        self.entry.route = Some(name.to_string());
    }

    fn status(&mut self, status: StatusCode) {
        self.entry.status = status.as_u16();
    }
}

impl Drop for AccessLog {
    fn drop(&mut self) {
        if let Some(logger) = &self.logger {
            self.entry.duration = self.started.elapsed();
            logger.log(&self.entry);
        }
    }
}
