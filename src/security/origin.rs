//! Origin and content-type gate for mutating requests.
//!
//! # Responsibilities
//! - Reject cross-site mutations (`Origin`, falling back to `Referer`)
//! - Reject mutating requests whose body is not JSON
//!
//! # Design Decisions
//! - Fail closed: missing, unparseable or mismatched headers reject
//! - Hosts compare as `host[:port]`, lowercase, with default ports dropped
//! - Header values are never logged

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::ApiError;
use crate::observability::metrics;

/// Why the gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: &'static str,
}

impl Rejection {
    const FORBIDDEN: Rejection = Rejection {
        status: StatusCode::FORBIDDEN,
        reason: "cross_origin",
    };
    const UNSUPPORTED_MEDIA_TYPE: Rejection = Rejection {
        status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
        reason: "content_type",
    };
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        if rejection.status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            ApiError::UnsupportedMediaType
        } else {
            ApiError::Forbidden("Forbidden".to_string())
        }
    }
}

pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Cross-site check. Non-mutating requests always pass.
pub fn validate_origin(method: &Method, headers: &HeaderMap, uri_host: Option<&str>) -> Option<Rejection> {
    if !is_mutating(method) {
        return None;
    }

    let request_host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or(uri_host)
        .map(normalize_host);
    let Some(request_host) = request_host else {
        return Some(Rejection::FORBIDDEN);
    };

    let source = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
        .and_then(|v| v.to_str().ok());
    let source_host = source
        .and_then(|v| url::Url::parse(v).ok())
        .and_then(|url| authority(&url));

    match source_host {
        Some(host) if host == request_host => None,
        _ => Some(Rejection::FORBIDDEN),
    }
}

/// Mutating requests must declare a JSON body.
pub fn validate_content_type(method: &Method, headers: &HeaderMap) -> Option<Rejection> {
    if !is_mutating(method) {
        return None;
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);

    if is_json {
        None
    } else {
        Some(Rejection::UNSUPPORTED_MEDIA_TYPE)
    }
}

fn authority(url: &url::Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

fn normalize_host(raw: &str) -> String {
    let host = raw.trim().to_ascii_lowercase();
    for default_port in [":80", ":443"] {
        if let Some(stripped) = host.strip_suffix(default_port) {
            return stripped.to_string();
        }
    }
    host
}

/// Middleware for browser-facing routes: origin first, then content type.
pub async fn origin_gate_middleware(request: Request<Body>, next: Next) -> Response {
    let rejection = validate_origin(request.method(), request.headers(), request.uri().host())
        .or_else(|| validate_content_type(request.method(), request.headers()));

    match rejection {
        Some(rejection) => reject(rejection, &request),
        None => next.run(request).await,
    }
}

/// Middleware for server-to-server routes: content type only.
pub async fn content_type_middleware(request: Request<Body>, next: Next) -> Response {
    match validate_content_type(request.method(), request.headers()) {
        Some(rejection) => reject(rejection, &request),
        None => next.run(request).await,
    }
}

fn reject(rejection: Rejection, request: &Request<Body>) -> Response {
    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        reason = rejection.reason,
        "Request rejected by gate"
    );
    metrics::record_rejection(rejection.reason);
    ApiError::from(rejection).into_response()
}
