//! Client identity for rate limiting.
//!
//! # Design Decisions
//! - Forwarding headers win over the TCP peer; the gateway expects to run
//!   behind a reverse proxy that sets them
//! - Only the first `X-Forwarded-For` entry is the client, the rest are hops
//! - Never fails: unknown callers share the `anonymous` partition

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub const ANONYMOUS: &str = "anonymous";

/// Derive the limiter partition key for a request.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_first_forwarded_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_identity(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_then_peer_then_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_identity(&headers, None), "198.51.100.2");

        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "192.0.2.1");

        assert_eq!(client_identity(&HeaderMap::new(), None), ANONYMOUS);
    }
}
