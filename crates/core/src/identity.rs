//! Deterministic session and visit identity.
//!
//! Identifiers are SHA-256 digests folded into version 8 UUIDs. Salts rotate
//! monthly (sessions) and hourly (visits) so raw client attributes never
//! need to be stored to reproduce an ID.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::limits::visit_timeout;
use crate::token::{ContinuityToken, TokenSigner};

/// Folds a SHA-256 digest of `parts` into a v8 UUID.
///
/// Parts are length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn hash_uuid(parts: &[&[u8]]) -> Uuid {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::new_v8(bytes)
}

pub fn start_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

pub fn start_of_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

fn salt(secret: &[u8], epoch: DateTime<Utc>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(epoch.timestamp().to_be_bytes());
    hasher.finalize().into()
}

/// Monthly salt for session IDs.
pub fn session_salt(secret: &[u8], at: DateTime<Utc>) -> [u8; 32] {
    salt(secret, start_of_month(at))
}

/// Hourly salt for visit IDs.
pub fn visit_salt(secret: &[u8], at: DateTime<Utc>) -> [u8; 32] {
    salt(secret, start_of_hour(at))
}

/// Client attributes that feed identity derivation.
#[derive(Debug, Clone, Copy)]
pub struct IdentityInput<'a> {
    pub website_id: Uuid,
    pub ip: &'a str,
    pub user_agent: &'a str,
    pub distinct_id: Option<&'a str>,
    /// Historical event time; bypasses the continuity token when set
    pub explicit_time: Option<DateTime<Utc>>,
    pub token: Option<&'a str>,
}

/// Identity for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub session_id: Uuid,
    pub visit_id: Uuid,
    pub issued_at: DateTime<Utc>,
    /// The caller's token was valid and its visit is still open
    pub continued: bool,
}

/// Derives session and visit IDs and signs continuity tokens.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    secret: Vec<u8>,
    signer: TokenSigner,
}

impl IdentityResolver {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref().to_vec();
        Self {
            signer: TokenSigner::new(&secret),
            secret,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn session_id(&self, input: &IdentityInput<'_>, at: DateTime<Utc>) -> Uuid {
        let website = input.website_id.as_bytes();
        match input.distinct_id {
            Some(distinct_id) => hash_uuid(&[website, distinct_id.as_bytes()]),
            None => hash_uuid(&[
                website,
                input.ip.as_bytes(),
                input.user_agent.as_bytes(),
                &session_salt(&self.secret, at),
            ]),
        }
    }

    pub fn visit_id(&self, session_id: Uuid, at: DateTime<Utc>) -> Uuid {
        hash_uuid(&[session_id.as_bytes(), &visit_salt(&self.secret, at)])
    }

    /// Opens a token, returning it only if it belongs to `website_id`.
    ///
    /// Any failure is treated as "no token".
    pub fn open_token(&self, raw: &str, website_id: Uuid) -> Option<ContinuityToken> {
        match self.signer.open(raw) {
            Ok(token) if token.website_id == website_id => Some(token),
            Ok(_) => {
                debug!(website_id = %website_id, "Ignoring token issued for another website");
                None
            }
            Err(e) => {
                debug!(error = %e, "Ignoring invalid continuity token");
                None
            }
        }
    }

    /// Resolves identity as of `now`.
    ///
    /// A verified, unexpired token for the website carries the visit as-is,
    /// even when the client's IP or the monthly salt has changed since it was
    /// issued.
    pub fn resolve(&self, input: &IdentityInput<'_>, now: DateTime<Utc>) -> ResolvedIdentity {
        if input.explicit_time.is_none() {
            let open = input
                .token
                .and_then(|raw| self.open_token(raw, input.website_id))
                .and_then(|token| token.issued_at().map(|iat| (token, iat)))
                .filter(|(_, iat)| !is_expired(*iat, now));

            if let Some((token, issued_at)) = open {
                return ResolvedIdentity {
                    session_id: token.session_id,
                    visit_id: token.visit_id,
                    issued_at,
                    continued: true,
                };
            }
        }

        let at = input.explicit_time.unwrap_or(now);
        let session_id = self.session_id(input, at);
        ResolvedIdentity {
            session_id,
            visit_id: self.visit_id(session_id, at),
            issued_at: at,
            continued: false,
        }
    }

    /// Signs a fresh token for the resolved identity.
    pub fn issue(
        &self,
        website_id: Uuid,
        identity: &ResolvedIdentity,
    ) -> Result<String, serde_json::Error> {
        self.signer.seal(&ContinuityToken {
            website_id,
            session_id: identity.session_id,
            visit_id: identity.visit_id,
            iat: identity.issued_at.timestamp(),
        })
    }
}

/// A visit is over once its token is older than the visit timeout.
pub fn is_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - issued_at > visit_timeout() || issued_at - now > Duration::minutes(1)
}
