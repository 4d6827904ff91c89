pub mod feed_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod photo_handlers;
pub mod user_handlers;

use crate::{
    auth::{CallerContext, Identity},
    errors::AppError,
    models::user::OwnerRef,
    services::OwnershipError,
    state::AppState,
};

/// Owner reference of an authenticated caller.
async fn caller_owner(state: &AppState, identity: &Identity) -> Result<OwnerRef, AppError> {
    Ok(state
        .accounts
        .owners()
        .resolve_owner(&identity.subject)
        .await?)
}

/// Owner reference of an optional caller. A token for an account that no
/// longer exists counts as anonymous.
async fn optional_caller_owner(
    state: &AppState,
    caller: &CallerContext,
) -> Result<Option<OwnerRef>, AppError> {
    let Some(identity) = caller.identity() else {
        return Ok(None);
    };
    match state.accounts.owners().resolve_owner(&identity.subject).await {
        Ok(owner) => Ok(Some(owner)),
        Err(OwnershipError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
