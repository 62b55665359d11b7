//! Rate limiting middleware.
//!
//! Every request is counted against a client key before any auth work. The
//! key is the socket peer unless `trust_proxy_headers` is set, in which case
//! the client IP reported by the proxy chain in front of the gateway
//! (Cloudflare, then Fly.io) wins. Only set it behind a proxy that overwrites
//! those headers.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::services::rate_limiter::Decision;
use crate::state::AppState;

/// Header reporting how many requests are left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Key used when neither headers nor the socket identify the client.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Proxy headers consulted in order. `x-forwarded-for` contributes its first hop.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "fly-client-ip",
];

/// Derive the rate limit key for a request.
///
/// With `trust_proxy_headers`, the first parseable IP from
/// [`CLIENT_IP_HEADERS`] wins. Otherwise (or when none parse) the peer
/// address is used, and `"unknown"` when there is none.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = CLIENT_IP_HEADERS.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        });
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, state.settings().trust_proxy_headers);

    match state.rate_limiter().check(&key) {
        Decision::Permit { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Decision::Deny { retry_after } => {
            tracing::warn!(client = %key, retry_after_ms = retry_after.as_millis() as u64, "Rate limited");
            AppError::RateLimited { retry_after }.into_response()
        }
    }
}
