//! Per-client rate limiting
//!
//! Each client IP gets its own token bucket allowing a fixed number of
//! requests per minute. Rejected requests get 429 with `retry-after`.
//!
//! Clients are keyed on the peer address. Proxy headers are only read when
//! `trust_proxy` is set, since any client can send them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use super::error::ErrorBody;
use crate::config::RateLimitConfig;

/// Number of tracked clients above which idle buckets are dropped
const PRUNE_THRESHOLD: usize = 10_000;

/// Shared rate limiter state
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    clock: DefaultClock,
    trust_proxy: bool,
}

impl RateLimitState {
    /// Creates a limiter allowing `per_minute` requests per client
    ///
    /// The full minute's allowance may be used as a burst.
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_minute(config.per_minute);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            clock: DefaultClock::default(),
            trust_proxy: config.trust_proxy,
        }
    }

    /// Checks and records one request for `ip`
    ///
    /// # Returns
    /// * `Ok(())` if the request is allowed
    /// * `Err(RateLimited)` with the seconds until the next slot frees up
    fn check(&self, ip: IpAddr) -> Result<(), RateLimited> {
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
        }

        self.limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            RateLimited {
                retry_after: wait.as_secs().max(1),
            }
        })
    }
}

/// Rejection for a client over its quota
#[derive(Debug)]
pub struct RateLimited {
    /// Seconds until a request would be accepted
    pub retry_after: u64,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody::new(
                "Too many requests, please try again later.",
            )),
        )
            .into_response();

        if let Ok(value) = HeaderValue::from_str(&self.retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Works out the client address
///
/// Uses the peer address, unless `trust_proxy` is set and the request carries
/// `x-forwarded-for` or `x-real-ip`.
fn client_ip(request: &Request, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(request) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();

    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request, state.trust_proxy);

    match state.check(ip) {
        Ok(()) => next.run(request).await,
        Err(limited) => {
            tracing::debug!(client = %ip, retry_after = limited.retry_after, "rate limited");
            limited.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::num::NonZeroU32;

    fn request_from(peer: &str, header: Option<(&str, &str)>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/mgnrega");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    fn limit(per_minute: u32, trust_proxy: bool) -> RateLimitState {
        RateLimitState::new(RateLimitConfig {
            per_minute: NonZeroU32::new(per_minute).unwrap(),
            trust_proxy,
        })
    }

    #[test]
    fn test_client_ip_uses_peer_by_default() {
        let request = request_from(
            "192.0.2.9:5555",
            Some(("x-forwarded-for", "203.0.113.7")),
        );
        assert_eq!(client_ip(&request, false), "192.0.2.9".parse::<IpAddr>().unwrap());

        let request = request_from("192.0.2.9:5555", Some(("x-real-ip", "198.51.100.2")));
        assert_eq!(client_ip(&request, false), "192.0.2.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_trusted_proxy_prefers_forwarded_for() {
        let request = request_from(
            "10.0.0.1:5555",
            Some(("x-forwarded-for", "203.0.113.7, 10.0.0.1")),
        );
        assert_eq!(client_ip(&request, true), "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_trusted_proxy_uses_real_ip() {
        let request = request_from("10.0.0.1:5555", Some(("x-real-ip", "198.51.100.2")));
        assert_eq!(client_ip(&request, true), "198.51.100.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_trusted_proxy_without_headers_uses_peer() {
        let request = request_from("192.0.2.9:5555", Some(("x-forwarded-for", "not-an-ip")));
        assert_eq!(client_ip(&request, true), "192.0.2.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_without_connect_info() {
        let request = axum::http::Request::builder()
            .uri("/api/mgnrega")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, false), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_check_rejects_after_quota() {
        let state = limit(2, false);
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let other: IpAddr = "192.0.2.2".parse().unwrap();

        assert!(state.check(ip).is_ok());
        assert!(state.check(ip).is_ok());
        let limited = state.check(ip).unwrap_err();
        assert!(limited.retry_after >= 1);

        assert!(state.check(other).is_ok(), "quota is per client");
    }

    #[test]
    fn test_rotating_forwarded_for_shares_peer_quota() {
        let state = limit(2, false);

        let keys: Vec<IpAddr> = ["198.51.100.1", "198.51.100.2", "198.51.100.3"]
            .into_iter()
            .map(|spoofed| {
                let request = request_from("192.0.2.1:4000", Some(("x-forwarded-for", spoofed)));
                client_ip(&request, state.trust_proxy)
            })
            .collect();

        assert!(state.check(keys[0]).is_ok());
        assert!(state.check(keys[1]).is_ok());
        assert!(state.check(keys[2]).is_err());
    }
}
