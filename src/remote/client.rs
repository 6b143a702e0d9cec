//! Remote data service client.
//!
//! The service is addressed by logical path: reads are `GET base?path=..&key=..`,
//! writes are `POST base` with `{ path, key, payload }`. Every response is a
//! JSON envelope `{ success, data?, error? }`.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::RemoteConfig;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote data service is not configured")]
    NotConfigured,

    #[error("invalid remote base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("remote request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote data service answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("remote data service reported failure: {0}")]
    Failed(String),

    #[error("unexpected remote response: {0}")]
    Decode(String),
}

/// Response envelope shared by every remote path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw downstream answer, passed through by the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    path: &'a str,
    key: &'a str,
    payload: &'a Value,
}

#[derive(Clone)]
pub struct RemoteDataClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RemoteDataClient {
    /// Build a client, or `None` when no base url is configured.
    pub fn from_config(config: &RemoteConfig) -> Result<Option<Self>, RemoteError> {
        let Some(base_url) = config.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Some(Self {
            http,
            base_url: Url::parse(base_url)?,
            api_key: config.api_key.clone().unwrap_or_default(),
        }))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Read `path`, returning whatever the service answered.
    pub async fn get_raw(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<RemoteResponse, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("path", path);
            pairs.append_pair("key", &self.api_key);
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        let result = self.http.get(url).send().await;
        self.finish("read", path, result).await
    }

    /// Write `payload` to `path`, returning whatever the service answered.
    pub async fn post_raw(&self, path: &str, payload: &Value) -> Result<RemoteResponse, RemoteError> {
        let request = WriteRequest {
            path,
            key: &self.api_key,
            payload,
        };
        let result = self
            .http
            .post(self.base_url.clone())
            .json(&request)
            .send()
            .await;
        self.finish("write", path, result).await
    }

    /// Read `path` and decode its `data`, failing on any non-success envelope.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, RemoteError> {
        let response = self.get_raw(path, query).await?;
        decode_data(response)
    }

    /// Write to `path`, failing on any non-success envelope.
    pub async fn submit(&self, path: &str, payload: &Value) -> Result<Option<Value>, RemoteError> {
        let response = self.post_raw(path, payload).await?;
        let envelope = into_envelope(response)?;
        Ok(envelope.data)
    }

    async fn finish(
        &self,
        kind: &'static str,
        path: &str,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<RemoteResponse, RemoteError> {
        let outcome = match result {
            Ok(response) => {
                let status = response.status();
                response
                    .json::<Value>()
                    .await
                    .map(|body| RemoteResponse { status, body })
                    .map_err(|e| RemoteError::from(e.without_url()))
            }
            // The url carries the API key.
            Err(e) => Err(RemoteError::from(e.without_url())),
        };

        match &outcome {
            Ok(response) => {
                metrics::record_remote_request(kind, response.status.is_success());
                tracing::debug!(kind, path, status = response.status.as_u16(), "Remote call finished");
            }
            Err(e) => {
                metrics::record_remote_request(kind, false);
                tracing::warn!(kind, path, error = %e, "Remote call failed");
            }
        }
        outcome
    }
}

fn into_envelope(response: RemoteResponse) -> Result<Envelope, RemoteError> {
    let envelope: Envelope = serde_json::from_value(response.body)
        .map_err(|e| RemoteError::Decode(e.to_string()))?;
    if !response.status.is_success() {
        return Err(RemoteError::Status {
            status: response.status.as_u16(),
            message: envelope.error.unwrap_or_default(),
        });
    }
    if !envelope.success {
        return Err(RemoteError::Failed(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(envelope)
}

fn decode_data<T: DeserializeOwned>(response: RemoteResponse) -> Result<T, RemoteError> {
    let envelope = into_envelope(response)?;
    serde_json::from_value(envelope.data.unwrap_or(Value::Null))
        .map_err(|e| RemoteError::Decode(e.to_string()))
}
