//! Remote data service proxy (`GET /gas`, `POST /gas`).
//!
//! # Responsibilities
//! - Allow-list logical paths and check their declared fields
//! - Bind the caller's `studentId` to the session
//! - Forward with the api key and pass the envelope through
//!
//! # Design Decisions
//! - Client-supplied `key` is dropped; only the configured one is sent
//! - Unknown paths are a 400, not a 404, so path names are not probed

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{RemoteConfig, RemotePathRule};
use crate::http::handlers::parse_body;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::remote::{RemoteError, RemoteResponse};
use crate::security::Identity;

const STUDENT_ID: &str = "studentId";

/// Allow-listed remote paths.
#[derive(Debug, Clone, Default)]
pub struct ProxyRules {
    read: BTreeMap<String, RemotePathRule>,
    write: BTreeMap<String, RemotePathRule>,
}

impl ProxyRules {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            read: config.read_paths.clone(),
            write: config.write_paths.clone(),
        }
    }

    pub fn read_rule(&self, path: &str) -> Option<&RemotePathRule> {
        self.read.get(path)
    }

    pub fn write_rule(&self, path: &str) -> Option<&RemotePathRule> {
        self.write.get(path)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WriteRequest {
    pub path: String,
    pub payload: Value,
}

pub async fn proxy_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let identity = state.sessions.verify(&headers).await?;
    let remote = state.remote.as_ref().ok_or(RemoteError::NotConfigured)?;

    let path = query
        .iter()
        .find(|(name, _)| name == "path")
        .map(|(_, value)| value.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("path is required".to_string()))?;
    let rule = state
        .proxy_rules
        .read_rule(&path)
        .ok_or_else(|| unknown_path(&path))?;

    let mut fields: Vec<(String, String)> = query
        .into_iter()
        .filter(|(name, _)| name != "path" && name != "key")
        .collect();
    match fields.iter().find(|(name, _)| name == STUDENT_ID) {
        Some((_, value)) if value != &identity.student_id => return Err(student_mismatch(&identity)),
        Some(_) => {}
        None => fields.push((STUDENT_ID.to_string(), identity.student_id.clone())),
    }
    if let Some(missing) = rule
        .required
        .iter()
        .find(|field| !fields.iter().any(|(name, value)| name == *field && !value.is_empty()))
    {
        return Err(ApiError::Validation(format!("{missing} is required")));
    }

    let response = remote.get_raw(&path, &fields).await?;
    Ok(passthrough(response))
}

pub async fn proxy_write(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let identity = state.sessions.verify(&headers).await?;
    let request = parse_body(body)?;
    let remote = state.remote.as_ref().ok_or(RemoteError::NotConfigured)?;

    let path = request.path.trim();
    if path.is_empty() {
        return Err(ApiError::Validation("path is required".to_string()));
    }
    let rule = state
        .proxy_rules
        .write_rule(path)
        .ok_or_else(|| unknown_path(path))?;

    let Value::Object(mut payload) = request.payload else {
        return Err(ApiError::Validation("payload must be an object".to_string()));
    };
    bind_student(&mut payload, &identity)?;
    if let Some(missing) = rule.required.iter().find(|field| is_blank(payload.get(*field))) {
        return Err(ApiError::Validation(format!("{missing} is required")));
    }

    let response = remote.post_raw(path, &Value::Object(payload)).await?;
    Ok(passthrough(response))
}

fn bind_student(payload: &mut Map<String, Value>, identity: &Identity) -> Result<(), ApiError> {
    match payload.get(STUDENT_ID) {
        None | Some(Value::Null) => {
            payload.insert(
                STUDENT_ID.to_string(),
                Value::String(identity.student_id.clone()),
            );
            Ok(())
        }
        Some(Value::String(id)) if *id == identity.student_id => Ok(()),
        Some(_) => Err(student_mismatch(identity)),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn unknown_path(path: &str) -> ApiError {
    tracing::warn!(path = %path, "Proxy call to unknown path refused");
    metrics::record_rejection("unknown_path");
    ApiError::Validation("Unknown path".to_string())
}

fn student_mismatch(identity: &Identity) -> ApiError {
    tracing::warn!(subject = %identity.subject, "Proxy call for another student refused");
    metrics::record_rejection("student_mismatch");
    ApiError::Forbidden("Forbidden".to_string())
}

/// Return the downstream envelope unchanged; non-error statuses become 200.
fn passthrough(response: RemoteResponse) -> Response {
    let status = if response.status.is_client_error() || response.status.is_server_error() {
        response.status
    } else {
        StatusCode::OK
    };
    (status, Json(response.body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            subject: "user-1".to_string(),
            student_id: "s001".to_string(),
        }
    }

    #[test]
    fn test_student_id_is_injected_when_absent() {
        let mut payload = json!({ "title": "Dentist" }).as_object().unwrap().clone();
        bind_student(&mut payload, &identity()).unwrap();
        assert_eq!(payload[STUDENT_ID], "s001");
    }

    #[test]
    fn test_foreign_student_id_is_forbidden() {
        let mut payload = json!({ "studentId": "s999" }).as_object().unwrap().clone();
        let err = bind_student(&mut payload, &identity()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let mut numeric = json!({ "studentId": 1 }).as_object().unwrap().clone();
        assert!(bind_student(&mut numeric, &identity()).is_err());
    }

    #[test]
    fn test_blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("  "))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!("x"))));
    }

    #[test]
    fn test_passthrough_keeps_error_status() {
        let response = passthrough(RemoteResponse {
            status: StatusCode::NOT_FOUND,
            body: json!({ "success": false, "error": "missing" }),
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = passthrough(RemoteResponse {
            status: StatusCode::FOUND,
            body: json!({ "success": true }),
        });
        assert_eq!(response.status(), StatusCode::OK);
    }
}
