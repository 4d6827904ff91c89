//! Request identity: token extraction, verification and typed extractors.
//!
//! `require_identity` guards routes that need a caller; `detect_identity`
//! annotates routes where a caller is optional. Handlers read the result via
//! the `Identity` and `CallerContext` extractors.

use super::token::Claims;
use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// Verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub claims: Claims,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            claims,
        }
    }
}

/// Caller as seen by routes behind `detect_identity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerContext {
    Anonymous,
    Authenticated(Identity),
}

impl CallerContext {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            CallerContext::Anonymous => None,
            CallerContext::Authenticated(identity) => Some(identity),
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or(CallerContext::Anonymous))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Carrier {
    Missing,
    /// A carrier header is present but cannot be read as text.
    Unreadable,
    Token(String),
}

/// The `token` cookie wins over an `Authorization: Bearer` header.
fn token_carrier(headers: &HeaderMap) -> Carrier {
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            return Carrier::Unreadable;
        };
        let found = value
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == TOKEN_COOKIE)
            .map(|(_, token)| token.trim_matches('"'));
        if let Some(token) = found {
            return Carrier::Token(token.to_string());
        }
    }

    match headers.get(AUTHORIZATION).map(|value| value.to_str()) {
        None => Carrier::Missing,
        Some(Err(_)) => Carrier::Unreadable,
        Some(Ok(value)) => value
            .strip_prefix("Bearer ")
            .map(|token| Carrier::Token(token.trim().to_string()))
            .unwrap_or(Carrier::Missing),
    }
}

/// Rejects the request unless it carries a valid session token.
///
/// - no token: 401
/// - unreadable carrier or malformed token: 400
/// - bad signature or expired token: 401
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match token_carrier(request.headers()) {
        Carrier::Token(token) => token,
        Carrier::Missing => return Err(AppError::unauthorized("authentication required")),
        Carrier::Unreadable => return Err(AppError::bad_request("unreadable token carrier")),
    };

    let claims = state.tokens.verify(&token)?;
    request.extensions_mut().insert(Identity::from(claims));
    Ok(next.run(request).await)
}

/// Never rejects. Inserts a `CallerContext` describing whoever is calling.
pub async fn detect_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match token_carrier(request.headers()) {
        Carrier::Token(token) => match state.tokens.verify(&token) {
            Ok(claims) => CallerContext::Authenticated(Identity::from(claims)),
            Err(err) => {
                tracing::debug!("ignoring unusable token on optional route: {}", err);
                CallerContext::Anonymous
            }
        },
        Carrier::Missing | Carrier::Unreadable => CallerContext::Anonymous,
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn finds_token_among_other_cookies() {
        let map = headers(&[("cookie", "theme=dark; token=abc.def.ghi; lang=en")]);
        assert_eq!(token_carrier(&map), Carrier::Token("abc.def.ghi".into()));
    }

    #[test]
    fn cookie_beats_bearer_header() {
        let map = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "token=from-cookie"),
        ]);
        assert_eq!(token_carrier(&map), Carrier::Token("from-cookie".into()));
    }

    #[test]
    fn bearer_header_is_accepted() {
        let map = headers(&[("authorization", "Bearer a.b.c")]);
        assert_eq!(token_carrier(&map), Carrier::Token("a.b.c".into()));
    }

    #[test]
    fn absent_or_foreign_scheme_is_missing() {
        assert_eq!(token_carrier(&HeaderMap::new()), Carrier::Missing);
        let map = headers(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(token_carrier(&map), Carrier::Missing);
        let map = headers(&[("cookie", "session=xyz")]);
        assert_eq!(token_carrier(&map), Carrier::Missing);
    }

    #[test]
    fn non_utf8_cookie_is_unreadable() {
        let mut map = HeaderMap::new();
        map.insert(COOKIE, HeaderValue::from_bytes(b"token=\xff\xfe").unwrap());
        assert_eq!(token_carrier(&map), Carrier::Unreadable);
    }
}
