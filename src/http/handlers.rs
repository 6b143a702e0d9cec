//! Push endpoint handlers.
//!
//! Bodies are taken as `Result<Json<_>, JsonRejection>` so malformed input
//! is reported as 400 with the usual `{ "error": .. }` body, after the
//! caller has been authenticated.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::push::{DispatchSummary, NotificationPayload};
use crate::security::send_secret_matches;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionBody {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub subscription: SubscriptionBody,
    pub student_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: DispatchSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

pub(crate) fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Malformed request body");
        ApiError::Validation("Invalid request body".to_string())
    })
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn push_public_key(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    match &state.public_key {
        Some(key) => Ok(Json(PublicKeyResponse {
            public_key: key.to_string(),
        })),
        None => Err(ApiError::Unavailable(
            "Push notifications are not configured.".to_string(),
        )),
    }
}

pub async fn push_subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let identity = state.sessions.verify(&headers).await.inspect_err(|_| {
        metrics::record_rejection("unauthenticated");
    })?;
    let request = parse_body(body)?;

    let student_id = request.student_id.trim();
    if !student_id.is_empty() && student_id != identity.student_id {
        tracing::warn!(subject = %identity.subject, "Subscribe for another student refused");
        metrics::record_rejection("student_mismatch");
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }

    state
        .registry
        .subscribe(
            student_id,
            &request.subscription.endpoint,
            &request.subscription.keys.p256dh,
            &request.subscription.keys.auth,
        )
        .await?;

    Ok(SuccessResponse::ok())
}

pub async fn push_unsubscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.sessions.verify(&headers).await.inspect_err(|_| {
        metrics::record_rejection("unauthenticated");
    })?;
    let request = parse_body(body)?;

    state.registry.unsubscribe(&request.endpoint).await?;
    Ok(SuccessResponse::ok())
}

pub async fn push_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NotificationPayload>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    if !send_secret_matches(state.send_secret.as_deref(), &headers) {
        metrics::record_rejection("bad_send_secret");
        return Err(ApiError::Authentication("Unauthorized".to_string()));
    }
    let Some(dispatcher) = &state.dispatcher else {
        return Err(ApiError::Unavailable(
            "Push notifications are not configured.".to_string(),
        ));
    };
    let payload = parse_body(body)?;

    let summary = dispatcher.dispatch(&payload).await?;
    Ok(Json(SendResponse {
        success: true,
        summary,
    }))
}
