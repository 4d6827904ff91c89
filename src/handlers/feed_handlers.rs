//! Listing endpoints under `/feed`.

use super::caller_owner;
use crate::{auth::Identity, errors::AppError, models::photo::FeedItem, state::AppState};
use axum::{Json, extract::State};

/// `GET /feed/public`: every public photo, from every owner.
pub async fn public_feed(State(state): State<AppState>) -> Result<Json<Vec<FeedItem>>, AppError> {
    Ok(Json(state.photos.public_feed().await?))
}

/// `GET /feed/home`: the caller's own photos, public and private.
pub async fn home_feed(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<FeedItem>>, AppError> {
    let owner = caller_owner(&state, &identity).await?;
    Ok(Json(state.photos.gallery(&owner).await?))
}
