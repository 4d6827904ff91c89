//! PhotoService: upload, delete, details and listings.
//!
//! Visibility changes are delegated to `VisibilityMigrator` and every URL goes
//! through `AccessUrlIssuer`, so placement and read authorization are decided
//! in exactly one place each.

use super::{
    access::AccessUrlIssuer,
    error::{ServiceError, ServiceResult},
    migration::{VisibilityChange, VisibilityMigrator},
};
use crate::{
    models::{
        photo::{FeedItem, Photo, PhotoDetails},
        user::OwnerRef,
    },
    repositories::{PhotoRepository, UserRepository},
    storage::{BucketPolicy, ByteStream, ObjectStore},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct PhotoService {
    photos: Arc<dyn PhotoRepository>,
    users: Arc<dyn UserRepository>,
    objects: Arc<dyn ObjectStore>,
    policy: BucketPolicy,
    migrator: VisibilityMigrator,
    access: AccessUrlIssuer,
}

impl PhotoService {
    pub fn new(
        photos: Arc<dyn PhotoRepository>,
        users: Arc<dyn UserRepository>,
        objects: Arc<dyn ObjectStore>,
        policy: BucketPolicy,
    ) -> Self {
        Self {
            migrator: VisibilityMigrator::new(photos.clone(), objects.clone(), policy.clone()),
            access: AccessUrlIssuer::new(objects.clone(), policy.clone()),
            photos,
            users,
            objects,
            policy,
        }
    }

    /// Write the bytes first and create the record only once they are durable.
    /// A failed write leaves no record; the store discards partial data.
    pub async fn upload(
        &self,
        owner: &OwnerRef,
        body: ByteStream<'_>,
        is_public: bool,
    ) -> ServiceResult<String> {
        let photo = Photo {
            id: Uuid::new_v4().to_string(),
            owner_ref: *owner,
            is_public,
            version: 0,
            created_at: Utc::now(),
        };
        let bucket = self.policy.bucket_for_photo(&photo);

        let info = self.objects.write(&bucket, &photo.id, body).await?;
        debug!(
            "stored {} bytes at {}/{} (etag {})",
            info.size_bytes, info.bucket, info.key, info.etag
        );

        if let Err(err) = self.photos.create(&photo).await {
            error!("record for photo {} not created: {}", photo.id, err);
            if let Err(cleanup) = self.objects.delete(&bucket, &photo.id).await {
                error!(
                    "orphaned object {}/{} left behind: {}",
                    bucket, photo.id, cleanup
                );
            }
            return Err(err.into());
        }

        info!("photo {} uploaded (public: {})", photo.id, is_public);
        Ok(photo.id)
    }

    pub async fn change_visibility(
        &self,
        photo_id: &str,
        requested_is_public: bool,
        caller: &OwnerRef,
    ) -> ServiceResult<VisibilityChange> {
        self.migrator
            .change_visibility(photo_id, requested_is_public, caller)
            .await
    }

    /// Bytes first, then the record. Refused with `Conflict` while a visibility
    /// change of the same photo is in flight.
    pub async fn delete(&self, photo_id: &str, caller: &OwnerRef) -> ServiceResult<()> {
        self.migrator.delete(photo_id, caller).await
    }

    /// Details as seen by `caller`. A missing photo and a private photo owned by
    /// someone else produce the same `Forbidden`.
    pub async fn details(
        &self,
        photo_id: &str,
        caller: Option<&OwnerRef>,
    ) -> ServiceResult<PhotoDetails> {
        let photo = self
            .photos
            .get(photo_id)
            .await?
            .ok_or(ServiceError::Forbidden)?;
        let image_url = self.access.issue(&photo, caller)?;

        let username = self
            .users
            .find_by_owner_ref(&photo.owner_ref)
            .await?
            .map(|user| user.username)
            .unwrap_or_default();

        Ok(PhotoDetails {
            is_owned_by_caller: caller.is_some_and(|owner| *owner == photo.owner_ref),
            id: photo.id,
            is_public: photo.is_public,
            username,
            image_url,
        })
    }

    /// Every public photo from every owner.
    pub async fn public_feed(&self) -> ServiceResult<Vec<FeedItem>> {
        let photos = self.photos.find_public().await?;
        self.feed_items(&photos, None)
    }

    /// Every photo owned by `owner`, public and private.
    pub async fn gallery(&self, owner: &OwnerRef) -> ServiceResult<Vec<FeedItem>> {
        let photos = self.photos.find_by_owner(owner).await?;
        self.feed_items(&photos, Some(owner))
    }

    pub async fn reconcile_pending(&self) -> ServiceResult<usize> {
        self.migrator.reconcile_pending().await
    }

    fn feed_items(&self, photos: &[Photo], caller: Option<&OwnerRef>) -> ServiceResult<Vec<FeedItem>> {
        photos
            .iter()
            .map(|photo| {
                Ok(FeedItem {
                    id: photo.id.clone(),
                    image_url: self.access.issue(photo, caller)?,
                })
            })
            .collect()
    }
}
