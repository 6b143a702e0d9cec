//! Caller authentication.
//!
//! # Responsibilities
//! - Resolve an end-user session into an `Identity` (bearer token or cookie)
//! - Check the shared secret presented by backend jobs on `/push-send`
//!
//! # Design Decisions
//! - Session issuance lives elsewhere; this side only verifies
//! - Without a configured secret every check fails (401), never passes
//! - Secret comparison does not short-circuit on the first differing byte

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jwt_simple::prelude::{HS256Key, MACLike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub student_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session")]
    MissingCredentials,

    #[error("invalid session")]
    InvalidSession,

    #[error("session verification is not configured")]
    NotConfigured,
}

/// Resolves request headers into an authenticated identity.
#[async_trait]
pub trait SessionVerifier: Send + Sync + 'static {
    async fn verify(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Custom claims carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "studentId")]
    pub student_id: String,
}

/// Verifies HS256 session tokens.
pub struct JwtSessionVerifier {
    key: Option<HS256Key>,
    cookie_name: String,
}

impl JwtSessionVerifier {
    pub fn new(config: &SessionConfig) -> Self {
        let key = config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| HS256Key::from_bytes(s.as_bytes()));
        Self {
            key,
            cookie_name: config.cookie_name.clone(),
        }
    }

    fn token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        bearer.or_else(|| cookie(headers, &self.cookie_name))
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let key = self.key.as_ref().ok_or(AuthError::NotConfigured)?;
        let token = self.token(headers).ok_or(AuthError::MissingCredentials)?;

        let claims = key
            .verify_token::<SessionClaims>(token, None)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                AuthError::InvalidSession
            })?;

        let subject = claims.subject.unwrap_or_default();
        let student_id = claims.custom.student_id;
        if subject.is_empty() || student_id.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        Ok(Identity {
            subject,
            student_id,
        })
    }
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}

/// Check `Authorization: Bearer <secret>` against the configured send secret.
pub fn send_secret_matches(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return false;
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(presented) => constant_time_eq(presented.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
