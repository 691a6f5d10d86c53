//! HTTP Server Adapter
//!
//! One listener per (address, protocol). Each server owns the routes
//! registered on its address and hands every request to the shared
//! dispatcher.

use super::TlsConfig;
use crate::application::dispatcher::{Dispatcher, RoutePool};
use crate::domain::entities::ConnectionInfo;
use crate::domain::ports::{HttpHandler, HttpRequest, HttpResponse, Route};
use crate::error::{GatewayError, Result};
use crate::infrastructure::ShutdownController;
use async_trait::async_trait;
use axum::body::Body;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpProto {
    Http,
    Https,
}

impl std::fmt::Display for HttpProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpProto::Http => write!(f, "http"),
            HttpProto::Https => write!(f, "https"),
        }
    }
}

pub struct HttpServer {
    addr: String,
    local_addr: SocketAddr,
    proto: HttpProto,
    routes: RoutePool,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownController,
}

impl HttpServer {
    /// Bind `addr` and start accepting connections.
    ///
    /// Binding is synchronous so a failed listen is reported before the
    /// server is visible to anyone. Must be called within a Tokio runtime.
    pub fn listen(
        addr: &str,
        proto: HttpProto,
        dispatcher: Arc<Dispatcher>,
        tls: Option<TlsConfig>,
    ) -> Result<Arc<Self>> {
        let listen_err = |source| GatewayError::Listen {
            addr: addr.to_string(),
            source,
        };

        let std_listener = std::net::TcpListener::bind(addr).map_err(listen_err)?;
        std_listener.set_nonblocking(true).map_err(listen_err)?;
        let listener = TcpListener::from_std(std_listener).map_err(listen_err)?;
        let local_addr = listener.local_addr().map_err(listen_err)?;

        if proto == HttpProto::Https && tls.is_none() {
            tracing::warn!("{} server on {} has no certificate, serving plaintext", proto, addr);
        }

        let server = Arc::new(Self {
            addr: addr.to_string(),
            local_addr,
            proto,
            routes: RoutePool::new(),
            dispatcher,
            shutdown: ShutdownController::new(),
        });

        tracing::info!("{} server listening on {} ({})", proto, addr, local_addr);
        tokio::spawn(server.clone().accept_loop(listener, tls));
        Ok(server)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, tls: Option<TlsConfig>) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            self.accept_failed(e).await;
                            continue;
                        }
                    };
                    let server = self.clone();
                    let tls = tls.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, remote_addr, tls).await;
                    });
                }
                _ = self.shutdown.wait_for_shutdown() => break,
            }
        }
        tracing::info!("{} server on {} stopped accepting", self.proto, self.addr);
    }

    /// Log an accept error and back off before the next accept.
    async fn accept_failed(&self, e: std::io::Error) {
        tracing::error!("{} server on {}: accept failed: {}", self.proto, self.addr, e);
        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        tls: Option<TlsConfig>,
    ) {
        let _guard = self.shutdown.connection_guard();

        match tls {
            Some(tls) => match tls.acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    let info = ConnectionInfo {
                        remote_addr,
                        tls: true,
                    };
                    self.serve_io(TokioIo::new(tls_stream), info).await;
                }
                Err(e) => tracing::debug!("TLS handshake failed from {}: {}", remote_addr, e),
            },
            None => {
                let info = ConnectionInfo {
                    remote_addr,
                    tls: false,
                };
                self.serve_io(TokioIo::new(stream), info).await;
            }
        }
    }

    async fn serve_io<I>(self: &Arc<Self>, io: I, info: ConnectionInfo)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let server = self.clone();
        let service = service_fn(move |req: http::Request<Incoming>| {
            let server = server.clone();
            async move {
                let mut req = req.map(Body::new);
                req.extensions_mut().insert(info);
                Ok::<_, Infallible>(server.serve(req).await)
            }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        let mut conn = std::pin::pin!(conn);
        let mut draining = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!("connection error from {}: {}", info.remote_addr, e);
                    }
                    break;
                }
                _ = self.shutdown.wait_for_shutdown(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    /// Configured listen address, the key this server is registered under.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn proto(&self) -> HttpProto {
        self.proto
    }

    pub fn add_route(&self, route: Arc<dyn Route>) {
        tracing::debug!("{} server on {}: added route {}", self.proto, self.addr, route.name());
        self.routes.insert(route.name().to_string(), route);
    }

    /// Remove `route` if it is still the one registered under its alias.
    pub fn del_route(&self, route: &Arc<dyn Route>) -> bool {
        let removed = self
            .routes
            .remove_if(route.name(), |_, current| same_route(current, route))
            .is_some();
        if removed {
            tracing::debug!("{} server on {}: removed route {}", self.proto, self.addr, route.name());
        }
        removed
    }

    pub fn find_route(&self, host: &str) -> Option<Arc<dyn Route>> {
        self.dispatcher.find_route(&self.routes, host)
    }

    pub fn route_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Stop accepting, let open connections finish their current request,
    /// and wait up to `drain` for them to close.
    pub async fn close(&self, drain: Duration) -> bool {
        self.shutdown.shutdown();
        self.shutdown.wait_for_drain(drain).await
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_shutdown()
    }
}

#[async_trait]
impl HttpHandler for HttpServer {
    async fn serve(&self, req: HttpRequest) -> HttpResponse {
        self.dispatcher.dispatch(&self.routes, req).await
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("addr", &self.addr)
            .field("local_addr", &self.local_addr)
            .field("proto", &self.proto)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Identity comparison of two route handles.
pub(crate) fn same_route(a: &Arc<dyn Route>, b: &Arc<dyn Route>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::HttpRoute;
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tracing_test::traced_test;

    struct Hello;

    #[async_trait]
    impl HttpHandler for Hello {
        async fn serve(&self, req: HttpRequest) -> HttpResponse {
            let peer = ConnectionInfo::from_request(&req)
                .map(|i| i.remote_addr.ip().to_string())
                .unwrap_or_default();
            http::Response::new(Body::from(format!("hello {}", peer)))
        }
    }

    fn route(alias: &str) -> Arc<dyn Route> {
        Arc::new(HttpRoute::new(alias, Arc::new(Hello)))
    }

    fn listen() -> Arc<HttpServer> {
        HttpServer::listen(
            "127.0.0.1:0",
            HttpProto::Http,
            Arc::new(Dispatcher::new("go")),
            None,
        )
        .unwrap()
    }

    async fn raw_get(addr: SocketAddr, host: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", host);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_listen_serves_routes() {
        let server = listen();
        server.add_route(route("app1"));

        let response = raw_get(server.local_addr(), "app1.local").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.ends_with("hello 127.0.0.1"), "{}", response);

        let response = raw_get(server.local_addr(), "app2.local").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);

        server.close(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_listen_address_in_use() {
        let server = listen();
        let taken = server.local_addr().to_string();

        let err = HttpServer::listen(&taken, HttpProto::Http, Arc::new(Dispatcher::new("go")), None)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Listen { .. }));
    }

    #[tokio::test]
    async fn test_del_route_only_removes_same_instance() {
        let server = listen();
        let first = route("app1");
        let second = route("app1");
        server.add_route(first.clone());
        server.add_route(second.clone());

        assert!(!server.del_route(&first));
        assert_eq!(server.num_routes(), 1);
        assert!(server.del_route(&second));
        assert!(server.find_route("app1").is_none());
    }

    #[tokio::test]
    async fn test_serve_without_socket() {
        let server = listen();
        server.add_route(route("app1"));

        let req = http::Request::builder()
            .header(http::header::HOST, "app1:8080")
            .body(Body::empty())
            .unwrap();
        assert_eq!(server.serve(req).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_accept_error_backs_off() {
        let server = listen();
        let started = std::time::Instant::now();
        server
            .accept_failed(std::io::Error::new(std::io::ErrorKind::Other, "too many open files"))
            .await;

        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
        assert!(logs_contain("accept failed: too many open files"));

        let response = raw_get(server.local_addr(), "app1.local").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
    }

    #[tokio::test]
    async fn test_close_stops_accepting() {
        let server = listen();
        let addr = server.local_addr();
        assert!(server.close(Duration::from_millis(500)).await);
        assert!(server.is_closed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
