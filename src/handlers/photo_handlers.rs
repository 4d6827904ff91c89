//! Photo endpoints under `/photo`.

use super::{caller_owner, optional_caller_owner};
use crate::{
    auth::{CallerContext, Identity},
    errors::AppError,
    models::photo::PhotoDetails,
    services::VisibilityChange,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError, rejection::JsonRejection},
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::io;

const FILE_FIELD: &str = "uploadFile";
const VISIBILITY_FIELD: &str = "IsPublic";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(rename = "PhotoID")]
    pub photo_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    #[serde(rename = "PhotoID")]
    pub photo_id: Option<String>,
    #[serde(rename = "IsPublic")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    #[serde(rename = "PhotoID")]
    pub photo_id: String,
    #[serde(rename = "IsPublic")]
    pub is_public: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "PhotoID")]
    pub photo_id: Option<String>,
}

fn bad_form(err: MultipartError) -> AppError {
    tracing::warn!("unreadable upload form: {}", err);
    AppError::bad_request(format!("unreadable form: {}", err.body_text()))
}

/// Accepts `1/0`, `t/f` and `true/false` in lower, upper or title case.
fn parse_flag(raw: &str) -> Result<bool, AppError> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(AppError::bad_request(format!(
            "{} must be a boolean, got `{}`",
            VISIBILITY_FIELD, other
        ))),
    }
}

fn require_photo_id(photo_id: Option<String>) -> Result<String, AppError> {
    photo_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("PhotoID is required"))
}

/// `POST /photo/upload` (multipart: `uploadFile`, `IsPublic`).
///
/// When `IsPublic` precedes the file the bytes are streamed straight into the
/// store; otherwise the file part is buffered until the flag arrives.
pub async fn upload_photo(
    State(state): State<AppState>,
    identity: Identity,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let owner = caller_owner(&state, &identity).await?;

    let mut is_public: Option<bool> = None;
    let mut buffered: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(VISIBILITY_FIELD) => {
                let raw = field.text().await.map_err(bad_form)?;
                is_public = Some(parse_flag(&raw)?);
            }
            Some(FILE_FIELD) => {
                if buffered.is_some() {
                    return Err(AppError::bad_request("only one uploadFile is accepted"));
                }
                if let Some(flag) = is_public {
                    let body = field
                        .map(|chunk| chunk.map_err(io::Error::other))
                        .boxed();
                    let photo_id = state.photos.upload(&owner, body, flag).await?;
                    return Ok(Json(UploadResponse { photo_id }));
                }
                buffered = Some(field.bytes().await.map_err(bad_form)?);
            }
            _ => {}
        }
    }

    let data = buffered.ok_or_else(|| AppError::bad_request("uploadFile is required"))?;
    let flag = is_public.ok_or_else(|| AppError::bad_request("IsPublic is required"))?;
    let body = stream::once(async move { Ok::<_, io::Error>(data) }).boxed();
    let photo_id = state.photos.upload(&owner, body, flag).await?;
    Ok(Json(UploadResponse { photo_id }))
}

/// `POST /photo/edit/permissions`
pub async fn edit_permissions(
    State(state): State<AppState>,
    identity: Identity,
    body: Result<Json<PermissionsRequest>, JsonRejection>,
) -> Result<Json<PermissionsResponse>, AppError> {
    let Json(req) = body?;
    let photo_id = require_photo_id(req.photo_id)?;
    let is_public = req
        .is_public
        .ok_or_else(|| AppError::bad_request("IsPublic is required"))?;
    let owner = caller_owner(&state, &identity).await?;

    let outcome = state
        .photos
        .change_visibility(&photo_id, is_public, &owner)
        .await?;

    let (changed, warning) = match outcome {
        VisibilityChange::Unchanged => (false, None),
        VisibilityChange::Migrated => (true, None),
        VisibilityChange::MigratedWithStaleCopy { stale_bucket } => (
            true,
            Some(format!(
                "visibility changed but a stale copy remains in `{}`",
                stale_bucket
            )),
        ),
    };
    Ok(Json(PermissionsResponse {
        photo_id,
        is_public,
        changed,
        warning,
    }))
}

/// `POST /photo/delete`
pub async fn delete_photo(
    State(state): State<AppState>,
    identity: Identity,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let photo_id = require_photo_id(req.photo_id)?;
    let owner = caller_owner(&state, &identity).await?;

    state.photos.delete(&photo_id, &owner).await?;
    Ok(Json(serde_json::json!({ "PhotoID": photo_id, "deleted": true })))
}

/// `GET /photo/{photo_id}`: anonymous callers see public photos only.
pub async fn photo_details(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(photo_id): Path<String>,
) -> Result<Json<PhotoDetails>, AppError> {
    let owner = optional_caller_owner(&state, &caller).await?;
    let details = state.photos.details(&photo_id, owner.as_ref()).await?;
    Ok(Json(details))
}
