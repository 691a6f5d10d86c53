//! Reverse Proxy
//!
//! Forwards requests to a single plain-HTTP upstream.

use crate::domain::entities::ConnectionInfo;
use crate::domain::ports::{error_response, HttpHandler, HttpRequest, HttpResponse};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use axum::body::Body;
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct ReverseProxy {
    name: String,
    authority: Authority,
    base_path: String,
    client: Client<HttpConnector, Body>,
}

impl ReverseProxy {
    /// Proxy to `url`, which must be an `http://` URL. A path in the URL is
    /// prepended to every forwarded request path.
    pub fn new(name: impl Into<String>, url: &str) -> Result<Self> {
        let invalid = |reason: &str| GatewayError::InvalidUpstream {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("not a valid url"))?;
        if uri.scheme() != Some(&Scheme::HTTP) {
            return Err(invalid("only http upstreams are supported"));
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        let base_path = uri.path().trim_end_matches('/').to_string();

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(10)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            name: name.into(),
            authority,
            base_path,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn upstream_uri(&self, original: &Uri) -> Result<Uri> {
        let path_and_query = original
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, path_and_query))
            .build()
            .map_err(|e| GatewayError::InvalidUpstream {
                url: self.authority.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Drop hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn set_forwarded_headers(req: &mut HttpRequest, original_host: Option<HeaderValue>) {
    let info = ConnectionInfo::from_request(req);
    let headers = req.headers_mut();

    if let Some(info) = info {
        let client = info.remote_addr.ip().to_string();
        let forwarded_for = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, client),
            None => client,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert("x-forwarded-for", value);
        }
    }

    if !headers.contains_key("x-forwarded-proto") {
        let proto = if info.is_some_and(|i| i.tls) { "https" } else { "http" };
        headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
    }

    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }
}

#[async_trait]
impl HttpHandler for ReverseProxy {
    async fn serve(&self, mut req: HttpRequest) -> HttpResponse {
        let uri = match self.upstream_uri(req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!("{}: {}", self.name, e);
                return error_response(StatusCode::BAD_GATEWAY, "bad gateway");
            }
        };

        let original_host = req.headers().get(HOST).cloned();
        strip_hop_by_hop(req.headers_mut());
        set_forwarded_headers(&mut req, original_host);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            req.headers_mut().insert(HOST, host);
        }
        *req.uri_mut() = uri;

        match self.client.request(req).await {
            Ok(resp) => {
                let mut resp = resp.map(Body::new);
                strip_hop_by_hop(resp.headers_mut());
                resp
            }
            Err(e) => {
                tracing::warn!("{}: upstream {} failed: {}", self.name, self.authority, e);
                error_response(StatusCode::BAD_GATEWAY, "bad gateway")
            }
        }
    }
}

impl std::fmt::Debug for ReverseProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseProxy")
            .field("name", &self.name)
            .field("authority", &self.authority)
            .field("base_path", &self.base_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(uri: &str) -> HttpRequest {
        let mut req = http::Request::builder()
            .uri(uri)
            .header(HOST, "app.example.com")
            .header("connection", "keep-alive, x-secret")
            .header("x-secret", "hop")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ConnectionInfo {
            remote_addr: SocketAddr::from(([192, 0, 2, 10], 5555)),
            tls: true,
        });
        req
    }

    #[test]
    fn test_new_rejects_bad_upstreams() {
        assert!(ReverseProxy::new("a", "not a url").is_err());
        assert!(ReverseProxy::new("a", "https://secure.local").is_err());
        assert!(ReverseProxy::new("a", "/relative").is_err());
        assert!(ReverseProxy::new("a", "http://10.0.0.1:8080").is_ok());
    }

    #[test]
    fn test_upstream_uri_joins_base_path() {
        let proxy = ReverseProxy::new("a", "http://10.0.0.1:8080/base/").unwrap();
        let uri = proxy.upstream_uri(&"/x/y?z=1".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:8080/base/x/y?z=1");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close, x-custom"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("x-keep", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-keep"));
    }

    #[tokio::test]
    async fn test_forwards_to_upstream() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/items"))
            .and(query_param("page", "2"))
            .and(header("x-forwarded-for", "192.0.2.10"))
            .and(header("x-forwarded-proto", "https"))
            .and(header("x-forwarded-host", "app.example.com"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&upstream)
            .await;

        let proxy = ReverseProxy::new("app", &upstream.uri()).unwrap();
        let resp = proxy.serve(request("/api/items?page=2")).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"created");

        let received = upstream.received_requests().await.unwrap();
        assert!(received[0].headers.get("x-secret").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let proxy = ReverseProxy::new("app", &format!("http://127.0.0.1:{}", port)).unwrap();

        let resp = proxy.serve(request("/")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
