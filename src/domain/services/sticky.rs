//! Sticky sessions
//!
//! Client affinity through a cookie holding a hash of the chosen server's
//! key. The hash is deterministic so the cookie survives restarts as long as
//! server keys stay the same.

use crate::domain::entities::{ConnectionInfo, Server};
use crate::domain::ports::{HttpRequest, HttpResponse};
use http::header::{HeaderValue, COOKIE, SET_COOKIE};
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

pub const STICKY_COOKIE_NAME: &str = "godoxy_lb_sticky";

/// 64-bit non-cryptographic hash of `data`.
pub fn hash64(data: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data);
    hasher.finish()
}

/// Cookie value identifying `server`: lowercase hex of its key hash.
pub fn sticky_id(server: &Server) -> String {
    format!("{:x}", hash64(server.key().as_bytes()))
}

/// Whether the client reached us over TLS, directly or via a proxy that
/// declares `X-Forwarded-Proto: https`.
pub fn is_secure(req: &HttpRequest) -> bool {
    if ConnectionInfo::from_request(req).is_some_and(|info| info.tls) {
        return true;
    }
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn cookie_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}

/// The server the request's sticky cookie points at, if it is among
/// `servers`.
pub fn server_from_cookie(req: &HttpRequest, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
    let id = cookie_value(req, STICKY_COOKIE_NAME)?;
    servers.iter().find(|srv| sticky_id(srv) == id).cloned()
}

/// Attach the sticky cookie for `server` to `resp`.
pub fn set_sticky_cookie(resp: &mut HttpResponse, server: &Server, max_age: Duration, secure: bool) {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        STICKY_COOKIE_NAME,
        sticky_id(server),
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }

    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            resp.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("invalid sticky cookie for {}: {}", server.name(), e),
    }
}
