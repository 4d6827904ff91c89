//! Authorizes reads and mints time-limited download URLs.

use super::error::{ServiceError, ServiceResult};
use crate::{
    models::{photo::Photo, user::OwnerRef},
    storage::{AccessMethod, BucketPolicy, ObjectStore},
};
use std::{sync::Arc, time::Duration};

/// Validity window of every issued download URL.
pub const ACCESS_URL_TTL: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Clone)]
pub struct AccessUrlIssuer {
    objects: Arc<dyn ObjectStore>,
    policy: BucketPolicy,
}

impl AccessUrlIssuer {
    pub fn new(objects: Arc<dyn ObjectStore>, policy: BucketPolicy) -> Self {
        Self { objects, policy }
    }

    /// Public photos are readable by anyone, anonymous callers included.
    /// Private photos only by their owner; everyone else gets `Forbidden`.
    pub fn issue(&self, photo: &Photo, caller: Option<&OwnerRef>) -> ServiceResult<String> {
        let entitled = photo.is_public || caller.is_some_and(|owner| *owner == photo.owner_ref);
        if !entitled {
            return Err(ServiceError::Forbidden);
        }

        let url = self.objects.signed_url(
            &self.policy.bucket_for_photo(photo),
            &photo.id,
            ACCESS_URL_TTL,
            AccessMethod::Get,
        )?;
        Ok(url)
    }
}
