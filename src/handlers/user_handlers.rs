//! Account endpoints under `/user`.

use crate::{
    auth::{Identity, SessionToken, middleware::TOKEN_COOKIE},
    errors::AppError,
    state::AppState,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    fn require_both(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::bad_request("username and password are required"));
        }
        Ok(())
    }
}

/// `POST /user/signup`
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(creds) = body?;
    creds.require_both()?;
    state.accounts.signup(&creds.username, &creds.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "username": creds.username.trim() })),
    ))
}

/// `POST /user/authenticate`: sets the `token` cookie on success.
pub async fn authenticate(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(creds) = body?;
    creds.require_both()?;
    let session = state
        .accounts
        .authenticate(&creds.username, &creds.password)
        .await?;
    session_response(&session)
}

/// `POST /user/refresh`: re-issues the caller's token inside the grace window.
pub async fn refresh(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Response, AppError> {
    let session = state.accounts.refresh(&identity.claims)?;
    session_response(&session)
}

/// `POST /user/logout`: expires the cookie. The token itself stays valid
/// until its own expiry.
pub async fn logout(identity: Identity) -> Result<Response, AppError> {
    tracing::info!("`{}` logged out", identity.subject);
    let mut response = Json(json!({ "status": "logged out" })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("token=; Path=/; HttpOnly; Max-Age=0"),
    );
    Ok(response)
}

fn session_response(session: &SessionToken) -> Result<Response, AppError> {
    let expires = session.claims.expires_at();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Expires={}",
        TOKEN_COOKIE,
        session.token,
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(AppError::internal)?;

    let mut response = Json(json!({
        "token": session.token,
        "expires_at": expires.to_rfc3339(),
    }))
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}
