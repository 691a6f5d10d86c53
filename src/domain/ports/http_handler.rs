//! HTTP Handler Port
//!
//! The request handling capability consumed by the dispatch layer: route
//! handlers, backend servers, middleware and not-found handlers all plug in
//! through these traits.

use crate::error::Result;
use async_trait::async_trait;
use axum::body::Body;
use http::{header, StatusCode};

pub type HttpRequest = http::Request<Body>;
pub type HttpResponse = http::Response<Body>;

/// Plain-text response with the given status.
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    let mut resp = http::Response::new(Body::from(message.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

/// Something that turns a request into a response.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn serve(&self, req: HttpRequest) -> HttpResponse;

    /// Resume an idled backend.
    ///
    /// Handlers that cannot be woken keep the default, which does nothing.
    async fn try_wake(&self) -> Result<()> {
        Ok(())
    }
}

/// A middleware wraps the final handler of a request.
///
/// Implementations decide whether and how to call `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn serve(&self, next: &dyn HttpHandler, req: HttpRequest) -> HttpResponse;
}
