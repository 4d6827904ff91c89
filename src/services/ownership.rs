//! Maps token subjects to owner references.

use super::error::OwnershipError;
use crate::{models::user::OwnerRef, repositories::UserRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct OwnershipResolver {
    users: Arc<dyn UserRepository>,
}

impl OwnershipResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Resolve `subject` (a username) to the owner reference storage is keyed on.
    ///
    /// Several matching accounts are reported as `Ambiguous`; the first match is
    /// never picked.
    pub async fn resolve_owner(&self, subject: &str) -> Result<OwnerRef, OwnershipError> {
        let mut users = self.users.find_by_username(subject).await?;
        match users.len() {
            0 => Err(OwnershipError::NotFound(subject.to_string())),
            1 => Ok(users.remove(0).id),
            count => {
                tracing::error!(
                    "data integrity violation: {} accounts share subject `{}`",
                    count,
                    subject
                );
                Err(OwnershipError::Ambiguous {
                    subject: subject.to_string(),
                    count,
                })
            }
        }
    }
}
