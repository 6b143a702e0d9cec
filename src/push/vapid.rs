//! VAPID application keys.
//!
//! The private key signs every push request; the public key is what browsers
//! subscribe with. Both are base64url without padding. A public key that does
//! not belong to the private key would let clients subscribe successfully and
//! then have every delivery rejected, so the pair is checked at startup.

use base64::{encode_config, URL_SAFE_NO_PAD};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use web_push::VapidSignatureBuilder;

use crate::config::PushConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VapidError {
    #[error("VAPID configuration incomplete, missing {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),

    #[error("VAPID private key is not a valid P-256 key")]
    InvalidPrivateKey,

    #[error("VAPID public key does not belong to the private key")]
    KeyMismatch,

    #[error("VAPID subject must be a mailto: or https: URI")]
    InvalidSubject,
}

/// Validated signing material for push authentication.
#[derive(Clone)]
pub struct VapidKeys {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Keys from `config`; `Ok(None)` when none of the VAPID settings are present.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, VapidError> {
        let settings = [
            ("push.vapid_private_key", non_blank(&config.vapid_private_key)),
            ("push.vapid_public_key", non_blank(&config.vapid_public_key)),
            ("push.vapid_subject", non_blank(&config.vapid_subject)),
        ];
        let missing: Vec<&'static str> = settings
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        match (&settings[0].1, &settings[1].1, &settings[2].1) {
            (Some(private_key), Some(public_key), Some(subject)) => {
                let keys = Self {
                    private_key: private_key.to_string(),
                    public_key: public_key.to_string(),
                    subject: subject.to_string(),
                };
                keys.check()?;
                Ok(Some(keys))
            }
            _ if missing.len() == settings.len() => Ok(None),
            _ => Err(VapidError::Incomplete(missing)),
        }
    }

    fn check(&self) -> Result<(), VapidError> {
        if !(self.subject.starts_with("mailto:") || self.subject.starts_with("https:")) {
            return Err(VapidError::InvalidSubject);
        }
        if public_key_for(&self.private_key)? != self.public_key {
            return Err(VapidError::KeyMismatch);
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Encoded uncompressed public point for an encoded private key.
fn public_key_for(private_key: &str) -> Result<String, VapidError> {
    let builder = VapidSignatureBuilder::from_base64_no_sub(private_key, URL_SAFE_NO_PAD)
        .map_err(|_| VapidError::InvalidPrivateKey)?;
    Ok(encode_config(builder.get_public_key(), URL_SAFE_NO_PAD))
}

/// A freshly generated pair, printed by `push-gateway keygen`.
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    pub private_key: String,
    pub public_key: String,
}

impl GeneratedKeys {
    /// Environment lines that configure the gateway with these keys.
    pub fn env_lines(&self, subject: Option<&str>) -> Vec<String> {
        let mut lines = vec![
            format!("PUSH_GATEWAY_VAPID_PRIVATE_KEY={}", self.private_key),
            format!("PUSH_GATEWAY_VAPID_PUBLIC_KEY={}", self.public_key),
        ];
        if let Some(subject) = subject {
            lines.push(format!("PUSH_GATEWAY_VAPID_SUBJECT={subject}"));
        }
        lines
    }
}

pub fn generate_keys() -> Result<GeneratedKeys, VapidError> {
    generate_keys_with_rng(&mut OsRng)
}

pub fn generate_keys_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<GeneratedKeys, VapidError> {
    // Not every 32-byte string is a valid scalar; draw until one is.
    let mut secret = [0u8; 32];
    let key_pair = loop {
        rng.fill_bytes(&mut secret);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&secret) {
            break key_pair;
        }
    };

    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key = public_key_for(&private_key)?;
    Ok(GeneratedKeys {
        private_key,
        public_key,
    })
}
