//! Defines the HTTP surface of the photo service.
//!
//! ## Structure
//! - **Open**
//!   - `POST /user/signup`, `POST /user/authenticate`
//!   - `GET  /feed/public`
//!   - `GET  /objects/{bucket}/{*key}` (signed download; the signature is the credential)
//!   - `GET  /healthz`, `GET /readyz`
//! - **Caller required** (`require_identity`)
//!   - `POST /user/refresh`, `POST /user/logout`
//!   - `POST /photo/upload`, `POST /photo/edit/permissions`, `POST /photo/delete`
//!   - `GET  /feed/home`
//! - **Caller optional** (`detect_identity`)
//!   - `GET  /photo/{photo_id}`

use crate::{
    auth::{detect_identity, require_identity},
    handlers::{
        feed_handlers::{home_feed, public_feed},
        health_handlers::{healthz, readyz},
        object_handlers::get_signed_object,
        photo_handlers::{delete_photo, edit_permissions, photo_details, upload_photo},
        user_handlers::{authenticate, logout, refresh, signup},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Build the full router. `max_upload_bytes` caps request bodies.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    let open = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/user/signup", post(signup))
        .route("/user/authenticate", post(authenticate))
        .route("/feed/public", get(public_feed))
        .route("/objects/{bucket}/{*key}", get(get_signed_object));

    let protected = Router::new()
        .route("/user/refresh", post(refresh))
        .route("/user/logout", post(logout))
        .route("/photo/upload", post(upload_photo))
        .route("/photo/edit/permissions", post(edit_permissions))
        .route("/photo/delete", post(delete_photo))
        .route("/feed/home", get(home_feed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let optional = Router::new()
        .route("/photo/{photo_id}", get(photo_details))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            detect_identity,
        ));

    Router::new()
        .merge(open)
        .merge(protected)
        .merge(optional)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
