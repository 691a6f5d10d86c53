//! Middleware composition

use crate::domain::ports::{HttpHandler, HttpRequest, HttpResponse, Middleware};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs middlewares in order; the first one added is the outermost.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    handler: &'a dyn HttpHandler,
}

#[async_trait]
impl HttpHandler for Next<'_> {
    async fn serve(&self, req: HttpRequest) -> HttpResponse {
        match self.rest.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    rest,
                    handler: self.handler,
                };
                middleware.serve(&next, req).await
            }
            None => self.handler.serve(req).await,
        }
    }
}

#[async_trait]
impl Middleware for MiddlewareChain {
    async fn serve(&self, next: &dyn HttpHandler, req: HttpRequest) -> HttpResponse {
        Next {
            rest: &self.middlewares,
            handler: next,
        }
        .serve(req)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::StatusCode;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn serve(&self, next: &dyn HttpHandler, mut req: HttpRequest) -> HttpResponse {
            req.headers_mut().append("x-trail", self.0.parse().unwrap());
            let mut resp = next.serve(req).await;
            resp.headers_mut().append("x-trail", self.0.parse().unwrap());
            resp
        }
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn serve(&self, _next: &dyn HttpHandler, _req: HttpRequest) -> HttpResponse {
            crate::domain::ports::error_response(StatusCode::FORBIDDEN, "denied")
        }
    }

    struct Echo;

    #[async_trait]
    impl HttpHandler for Echo {
        async fn serve(&self, req: HttpRequest) -> HttpResponse {
            let trail: Vec<&str> = req
                .headers()
                .get_all("x-trail")
                .iter()
                .map(|v| v.to_str().unwrap())
                .collect();
            http::Response::new(Body::from(trail.join(",")))
        }
    }

    #[tokio::test]
    async fn test_chain_order() {
        let chain = MiddlewareChain::new(vec![Arc::new(Tag("outer")), Arc::new(Tag("inner"))]);
        let resp = chain.serve(&Echo, http::Request::new(Body::empty())).await;

        let on_way_out: Vec<&str> = resp
            .headers()
            .get_all("x-trail")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(on_way_out, vec!["inner", "outer"]);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"outer,inner");
    }

    #[tokio::test]
    async fn test_chain_short_circuit() {
        let mut chain = MiddlewareChain::default();
        chain.push(Arc::new(Deny));
        chain.push(Arc::new(Tag("never")));

        let resp = chain.serve(&Echo, http::Request::new(Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.headers().get("x-trail").is_none());
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::default();
        assert!(chain.is_empty());
        let resp = chain.serve(&Echo, http::Request::new(Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
