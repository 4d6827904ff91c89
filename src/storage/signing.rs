//! HMAC-SHA256 signatures for time-limited object URLs.
//!
//! The signed message is `METHOD\nbucket\nkey\nexpires`; the signature travels
//! base64url-encoded in the `signature` query parameter.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;

use super::AccessMethod;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(
        &self,
        method: AccessMethod,
        bucket: &str,
        key: &str,
        expires: i64,
    ) -> Result<HmacSha256, InvalidLength> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)?;
        mac.update(method.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(bucket.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn sign(
        &self,
        method: AccessMethod,
        bucket: &str,
        key: &str,
        expires: i64,
    ) -> Result<String, InvalidLength> {
        let tag = self.mac(method, bucket, key, expires)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(tag))
    }

    /// Constant-time check of `signature`, then of the expiry against `now`.
    pub fn verify(
        &self,
        method: AccessMethod,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Invalid)?;
        self.mac(method, bucket, key, expires)
            .map_err(|_| SignatureError::Invalid)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Invalid)?;
        if now >= expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature does not match")]
    Invalid,
    #[error("signed url has expired")]
    Expired,
}
