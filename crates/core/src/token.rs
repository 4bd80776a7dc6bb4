//! Signed continuity tokens.
//!
//! Format: `base64url(json) "." base64url(HMAC-SHA256(secret, encoded json))`.
//! The tag is verified in constant time before the payload is decoded, so no
//! embedded field is ever read from an unauthenticated token.

use std::marker::PhantomData;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a token could not be opened.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// HMAC-authenticated JSON capsule carrying a `T`.
pub struct SignedCapsule<T> {
    key: Vec<u8>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> SignedCapsule<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            _payload: PhantomData,
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }

    /// Serializes and signs a value.
    pub fn seal(&self, value: &T) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        let body = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac();
        mac.update(body.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{body}.{tag}"))
    }

    /// Verifies the tag, then decodes the payload.
    pub fn open(&self, token: &str) -> Result<T, TokenError> {
        let (body, tag) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(body.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl<T> Clone for SignedCapsule<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SignedCapsule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCapsule").finish_non_exhaustive()
    }
}

/// Visit continuity state handed to the client between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityToken {
    pub website_id: Uuid,
    pub session_id: Uuid,
    pub visit_id: Uuid,
    /// Visit issuance time, Unix seconds
    pub iat: i64,
}

impl ContinuityToken {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }
}

pub type TokenSigner = SignedCapsule<ContinuityToken>;
