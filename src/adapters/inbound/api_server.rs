//! Management API Server
//!
//! Read-only route reporting plus registration of load-balanced backends
//! under provider `api`.

use crate::adapters::outbound::ReverseProxy;
use crate::application::Entrypoint;
use crate::domain::entities::{HttpRoute, Server};
use crate::domain::ports::HealthMonitor;
use crate::domain::services::{LoadBalancer, LoadBalancerConfig, ServerWeight};
use crate::domain::value_objects::{HealthStatus, LoadBalanceMode};
use crate::error::GatewayError;
use crate::infrastructure::{HealthCheckConfig, ProbeHealthMonitor, StaticHealth};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub const API_PROVIDER: &str = "api";

/// Backend registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterServerRequest {
    /// Pool key; defaults to the URL.
    #[serde(default)]
    pub key: Option<String>,
    pub url: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub mode: LoadBalanceMode,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub sticky_max_age_secs: u64,
    /// Probe the backend instead of assuming it healthy.
    #[serde(default)]
    pub health_check: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterServerResponse {
    pub alias: String,
    pub key: String,
    pub mode: LoadBalanceMode,
    pub servers: Vec<ServerWeight>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub routes: usize,
    pub listeners: usize,
}

/// API error rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match e {
            GatewayError::InvalidUpstream { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub entrypoint: Arc<Entrypoint>,
    /// Load balancers created through the API, by alias.
    pub balancers: Arc<DashMap<String, Arc<LoadBalancer>>>,
    pub health_check: HealthCheckConfig,
}

impl ApiState {
    pub fn new(entrypoint: Arc<Entrypoint>) -> Self {
        Self {
            entrypoint,
            balancers: Arc::new(DashMap::new()),
            health_check: HealthCheckConfig::default(),
        }
    }

    /// Add a backend to the balancer behind `alias`, creating and
    /// registering the route on first use.
    pub fn register_server(
        &self,
        alias: &str,
        req: RegisterServerRequest,
    ) -> Result<RegisterServerResponse, ApiError> {
        let key = req.key.clone().unwrap_or_else(|| req.url.clone());
        let proxy = ReverseProxy::new(key.clone(), &req.url)?;

        let health: Arc<dyn HealthMonitor> = if req.health_check {
            let probe = Arc::new(ProbeHealthMonitor::from_url(&req.url, self.health_check.clone())?);
            probe.start();
            probe
        } else {
            Arc::new(StaticHealth::new(HealthStatus::Healthy))
        };

        let lb = self.balancer_for(alias, &req)?;
        lb.add_server(Arc::new(Server::new(
            key.clone(),
            req.url.clone(),
            req.weight,
            Arc::new(proxy),
            health,
        )));
        tracing::info!("api: registered {} ({}) under {}", key, req.url, alias);

        Ok(RegisterServerResponse {
            alias: alias.to_string(),
            key,
            mode: lb.mode(),
            servers: lb.server_weights(),
        })
    }

    fn balancer_for(
        &self,
        alias: &str,
        req: &RegisterServerRequest,
    ) -> Result<Arc<LoadBalancer>, ApiError> {
        let config = LoadBalancerConfig {
            link: alias.to_string(),
            mode: req.mode,
            sticky: req.sticky,
            sticky_max_age_secs: req.sticky_max_age_secs,
            options: Default::default(),
        };

        match self.balancers.entry(alias.to_string()) {
            Entry::Occupied(mut entry) if entry.get().task().is_finished() => {
                let lb = self.create_balancer(config)?;
                entry.insert(lb.clone());
                Ok(lb)
            }
            Entry::Occupied(entry) => {
                entry.get().update_config(config);
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let lb = self.create_balancer(config)?;
                entry.insert(lb.clone());
                Ok(lb)
            }
        }
    }

    fn create_balancer(&self, config: LoadBalancerConfig) -> Result<Arc<LoadBalancer>, ApiError> {
        let alias = config.link.clone();
        let lb = Arc::new(LoadBalancer::new(config));
        let route = HttpRoute::new(alias.clone(), lb.clone())
            .with_provider(API_PROVIDER)
            .with_health(lb.clone());

        let registration = self.entrypoint.add_route(Arc::new(route))?;
        registration.release_when_finished(lb.task().clone());

        let balancers = self.balancers.clone();
        let watched = lb.clone();
        tokio::spawn(async move {
            watched.task().finished().await;
            balancers.remove_if(&alias, |_, current| Arc::ptr_eq(current, &watched));
        });

        Ok(lb)
    }

    /// Remove backend `key` from `alias`. Removing the last one releases
    /// the route.
    pub fn remove_server(&self, alias: &str, key: &str) -> Option<usize> {
        let lb = self.balancers.get(alias).map(|lb| lb.value().clone())?;
        lb.remove_server(key)?;
        tracing::info!("api: removed {} from {}", key, alias);
        Some(lb.len())
    }
}

/// Management API server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, entrypoint: Arc<Entrypoint>) -> Self {
        Self {
            listen_addr,
            state: ApiState::new(entrypoint),
        }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/v1/providers", get(providers_handler))
            .route("/api/v1/stats", get(stats_handler))
            .route("/api/v1/routes", get(routes_handler))
            .route(
                "/api/v1/routes/:alias/servers",
                get(list_servers_handler).post(register_server_handler),
            )
            .route("/api/v1/routes/:alias/servers/:key", delete(remove_server_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }

    /// Serve until `shutdown` completes.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(self.state.clone());
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("management API listening on {}", self.listen_addr);

        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routes: state.entrypoint.num_routes(),
        listeners: state.entrypoint.servers().len(),
    })
}

async fn providers_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({ "providers": state.entrypoint.providers() }))
}

async fn stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.entrypoint.route_stats())
}

async fn routes_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let routes = state.entrypoint.routes();
    let total = routes.len();
    Json(serde_json::json!({ "routes": routes, "total": total }))
}

async fn list_servers_handler(
    State(state): State<ApiState>,
    Path(alias): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lb = state
        .balancers
        .get(&alias)
        .map(|lb| lb.value().clone())
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("no load balancer for {}", alias)))?;

    Ok(Json(serde_json::json!({
        "alias": alias,
        "mode": lb.mode(),
        "status": lb.status(),
        "detail": lb.detail(),
        "servers": lb.server_weights(),
    })))
}

async fn register_server_handler(
    State(state): State<ApiState>,
    Path(alias): Path<String>,
    Json(req): Json<RegisterServerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.register_server(&alias, req)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn remove_server_handler(
    State(state): State<ApiState>,
    Path((alias, key)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.remove_server(&alias, &key) {
        Some(remaining) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "alias": alias,
                "key": key,
                "removed": true,
                "remaining": remaining
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "alias": alias,
                "key": key,
                "error": "server not found"
            })),
        ),
    }
}
