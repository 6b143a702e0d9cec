//! Push data model.

use serde::{Deserialize, Serialize};

/// A subscriber's push channel plus the key material needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub student_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// One logical notification, serialized identically for every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: String::new(),
            url: None,
            tag: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Client-side presentation defaults merged into every delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub icon: String,
    pub badge: String,
    pub default_url: String,
}

impl From<&crate::config::PushConfig> for Presentation {
    fn from(config: &crate::config::PushConfig) -> Self {
        Self {
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            default_url: config.default_url.clone(),
        }
    }
}

/// What a subscriber's client receives after decryption.
#[derive(Debug, Serialize)]
pub struct DeliveredMessage<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub icon: &'a str,
    pub badge: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<&'a str>,
    pub url: &'a str,
}

impl<'a> DeliveredMessage<'a> {
    pub fn new(payload: &'a NotificationPayload, presentation: &'a Presentation) -> Self {
        Self {
            title: &payload.title,
            body: &payload.body,
            icon: &presentation.icon,
            badge: &presentation.badge,
            tag: payload.tag.as_deref(),
            url: payload.url.as_deref().unwrap_or(&presentation.default_url),
        }
    }
}

/// Result of one delivery attempt. Lives only for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub endpoint: String,
    pub success: bool,
    pub error_code: Option<u16>,
    /// The push service reported the endpoint as permanently gone.
    pub gone: bool,
    pub error: Option<String>,
}

/// Aggregate counts returned by a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}
