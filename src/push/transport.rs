//! Push transport.
//!
//! # Responsibilities
//! - Encrypt one message for one subscription and hand it to its push service
//! - Classify failures into transport, timeout and encoding errors
//!
//! # Design Decisions
//! - The dispatcher only sees the `PushTransport` trait; tests script it
//! - 404 and 410 from a push service mean the subscription is gone for good

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushClient, WebPushError,
    WebPushMessageBuilder,
};

use crate::push::types::PushSubscription;
use crate::push::vapid::VapidKeys;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The push service was unreachable or answered with an error status.
    #[error("push service error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    /// The attempt did not finish within its deadline.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// Payload or key material could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the push service reported the endpoint as permanently gone.
    pub fn is_gone(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }
}

/// Delivers one already-serialized message to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &str,
    ) -> Result<(), DeliveryError>;
}

/// Transport backed by the `web-push` crate (aes128gcm + VAPID).
pub struct WebPushTransport {
    vapid: VapidKeys,
    ttl: u32,
    client: WebPushClient,
}

impl WebPushTransport {
    pub fn new(vapid: VapidKeys, ttl: u32) -> Result<Self, WebPushError> {
        let client = WebPushClient::new()?;
        Ok(Self { vapid, ttl, client })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &str,
    ) -> Result<(), DeliveryError> {
        let subscription_info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );
        let mut builder = WebPushMessageBuilder::new(&subscription_info).map_err(classify)?;
        builder.set_payload(ContentEncoding::Aes128Gcm, message.as_bytes());
        builder.set_ttl(self.ttl);

        let mut signature_builder = VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )
        .map_err(classify)?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build().map_err(classify)?);

        let push_message = builder.build().map_err(classify)?;
        self.client.send(push_message).await.map_err(classify)
    }
}

fn classify(err: WebPushError) -> DeliveryError {
    let message = err.to_string();
    let status = match err {
        WebPushError::EndpointNotValid => Some(410),
        WebPushError::EndpointNotFound => Some(404),
        WebPushError::Unauthorized => Some(401),
        WebPushError::BadRequest(_) => Some(400),
        WebPushError::PayloadTooLarge => Some(413),
        WebPushError::ServerError(_) => Some(500),
        WebPushError::InvalidUri
        | WebPushError::MissingCryptoKeys
        | WebPushError::InvalidCryptoKeys => return DeliveryError::Encoding(message),
        _ => None,
    };
    DeliveryError::Transport { status, message }
}
