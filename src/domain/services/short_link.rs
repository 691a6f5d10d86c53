//! Short link redirects
//!
//! Requests to the reserved short-link host at `/{key}/{rest}` are answered
//! with a temporary redirect to the full route host.

use crate::domain::ports::{error_response, HttpHandler, HttpRequest, HttpResponse};
use async_trait::async_trait;
use axum::body::Body;
use dashmap::{DashMap, DashSet};
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use parking_lot::RwLock;

/// Resolves short keys to route hosts.
#[derive(Debug, Default)]
pub struct ShortLinkMatcher {
    /// Dotted aliases under their full form, plus first-label claims.
    fqdn_routes: DashMap<String, String>,
    /// Bare aliases expanded with the default suffix.
    subdomain_routes: DashSet<String>,
    default_domain_suffix: RwLock<String>,
}

impl ShortLinkMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the suffix bare aliases expand to. A leading `.` is added when
    /// missing; an empty suffix disables expansion.
    pub fn set_default_domain_suffix(&self, suffix: &str) {
        let suffix = suffix.trim();
        let normalized = if suffix.is_empty() || suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{}", suffix)
        };
        *self.default_domain_suffix.write() = normalized;
    }

    pub fn default_domain_suffix(&self) -> String {
        self.default_domain_suffix.read().clone()
    }

    pub fn add_route(&self, alias: &str) {
        let alias = alias.trim();
        if alias.is_empty() {
            return;
        }

        match alias.split_once('.') {
            Some((key, _)) => {
                self.fqdn_routes.insert(alias.to_string(), alias.to_string());
                if !key.is_empty() && !self.subdomain_routes.contains(key) {
                    self.fqdn_routes
                        .entry(key.to_string())
                        .or_insert_with(|| alias.to_string());
                }
            }
            None => {
                self.subdomain_routes.insert(alias.to_string());
            }
        }
    }

    pub fn del_route(&self, alias: &str) {
        let alias = alias.trim();
        if alias.is_empty() {
            return;
        }

        match alias.split_once('.') {
            Some((key, _)) => {
                self.fqdn_routes.remove(alias);
                self.fqdn_routes.remove_if(key, |_, target| target.as_str() == alias);
            }
            None => {
                self.subdomain_routes.remove(alias);
            }
        }
    }

    /// Target host for `key`.
    pub fn resolve(&self, key: &str) -> Option<String> {
        if let Some(target) = self.fqdn_routes.get(key) {
            return Some(target.value().clone());
        }
        if key.contains('.') {
            return None;
        }

        let suffix = self.default_domain_suffix.read();
        if !suffix.is_empty() && self.subdomain_routes.contains(key) {
            return Some(format!("{}{}", key, suffix));
        }
        None
    }
}

#[async_trait]
impl HttpHandler for ShortLinkMatcher {
    async fn serve(&self, req: HttpRequest) -> HttpResponse {
        let path = req.uri().path();
        let path = path.strip_prefix('/').unwrap_or(path);
        let (key, rest) = path.split_once('/').unwrap_or((path, ""));

        if key.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "short link key is required");
        }

        let Some(target) = self.resolve(key) else {
            tracing::debug!("short link {:?} not found", key);
            return error_response(StatusCode::NOT_FOUND, "short link not found");
        };

        let mut location = format!("https://{}/{}", target, rest);
        if let Some(query) = req.uri().query().filter(|q| !q.is_empty()) {
            location.push('?');
            location.push_str(query);
        }

        match HeaderValue::from_str(&location) {
            Ok(value) => {
                let mut resp = http::Response::new(Body::empty());
                *resp.status_mut() = StatusCode::TEMPORARY_REDIRECT;
                resp.headers_mut().insert(LOCATION, value);
                resp
            }
            Err(e) => {
                tracing::warn!("invalid short link target {:?}: {}", location, e);
                error_response(StatusCode::NOT_FOUND, "short link not found")
            }
        }
    }
}
