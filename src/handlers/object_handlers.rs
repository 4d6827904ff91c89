//! Signed object downloads.
//!
//! `GET /objects/{bucket}/{*key}?expires=..&signature=..` is the target of
//! every URL minted by the access issuer. The signature is the only
//! credential; no session is consulted.

use crate::{
    errors::AppError,
    state::AppState,
    storage::{ObjectStoreError, signing::SignatureError},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// Stream `bucket/key` if the query carries a valid, unexpired signature.
pub async fn get_signed_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return Err(AppError::forbidden("missing signature"));
    };

    state
        .objects
        .verify_signed_get(&bucket, &key, expires, &signature)
        .map_err(|err| {
            tracing::warn!("signed download of {}/{} refused: {}", bucket, key, err);
            match err {
                SignatureError::Expired => AppError::forbidden("link expired"),
                SignatureError::Invalid => AppError::forbidden("invalid signature"),
            }
        })?;

    let (file, len) = state
        .objects
        .open_object(&bucket, &key)
        .await
        .map_err(|err| match err {
            ObjectStoreError::ObjectNotFound { .. } => AppError::not_found("object not found"),
            ObjectStoreError::InvalidBucketName { .. } | ObjectStoreError::InvalidObjectKey => {
                AppError::not_found("object not found")
            }
            other => AppError::internal(other),
        })?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=300"),
    );
    Ok(response)
}
