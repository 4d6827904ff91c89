//! Session tokens: HS256 JWTs carrying `{ sub, exp }`.
//!
//! Tokens are stateless. Logout can only tell the client to drop its cookie;
//! a token that was already handed out stays verifiable until `exp`. Server-side
//! revocation would need a denylist or reference tokens.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use thiserror::Error;

/// Lifetime of every issued or refreshed session.
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Refresh is only honoured once remaining validity drops to this window.
pub const REFRESH_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly signed token together with the claims it encodes.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet within the refresh window")]
    TooEarly,
    #[error("token could not be signed: {0}")]
    Signing(String),
}

/// Issues and verifies session tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        // Expiry is checked by hand so callers can inject the clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<SessionToken, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|e| TokenError::Signing(e.to_string()))?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: now.timestamp() + ttl_secs,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(SessionToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Checks run in a fixed order: structure, signature, expiry. A token that
    /// fails an earlier check never reports a later failure.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = parse_structure(token)?;

        decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                _ => TokenError::Malformed,
            }
        })?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn refresh(&self, claims: &Claims) -> Result<SessionToken, TokenError> {
        self.refresh_at(claims, Utc::now())
    }

    /// Re-issue `claims` for another `SESSION_TTL`, but only inside the last
    /// `REFRESH_GRACE` of their lifetime.
    pub fn refresh_at(
        &self,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, TokenError> {
        let remaining = claims.exp - now.timestamp();
        if remaining <= 0 {
            return Err(TokenError::Expired);
        }
        if remaining as u64 > REFRESH_GRACE.as_secs() {
            return Err(TokenError::TooEarly);
        }
        self.issue_at(&claims.sub, SESSION_TTL, now)
    }
}

/// Header and payload must decode and the payload must carry `sub` and `exp`.
fn parse_structure(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if signature.is_empty() {
        return Err(TokenError::Malformed);
    }
    decode_header(token).map_err(|_| TokenError::Malformed)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice::<Claims>(&payload).map_err(|_| TokenError::Malformed)
}
