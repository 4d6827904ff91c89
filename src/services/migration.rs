//! Moves a photo's bytes between buckets when its visibility changes.
//!
//! Order is copy, delete source, commit record. The object is therefore never
//! missing from both buckets; the worst outcome is a stale duplicate in the
//! source bucket, which is recorded and purged by the next reconcile. Every
//! move is journaled first (`visibility_migrations`). The journal row doubles
//! as a per-photo lock, also taken by deletes, and lets `reconcile_pending`
//! settle work interrupted by a crash.

use super::error::{ServiceError, ServiceResult};
use crate::{
    models::{migration::MigrationEntry, photo::Photo, user::OwnerRef},
    repositories::{PhotoRepository, RepoError},
    storage::{BucketPolicy, ObjectStore, ObjectStoreError},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a successful visibility change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityChange {
    /// Requested visibility equals the current one; storage was not touched.
    Unchanged,
    Migrated,
    /// Committed, but the old copy could not be removed from `stale_bucket`.
    /// It is recorded and removed by the next reconcile pass.
    MigratedWithStaleCopy { stale_bucket: String },
}

/// How `reconcile_pending` settled a journaled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The record had been committed before the interruption; only the stale
    /// source copy had to go.
    AlreadyCommitted,
    /// The move was redone from wherever the bytes were and then committed.
    CompletedForward,
    /// The record is gone, or was being deleted; every copy was removed.
    Discarded,
}

#[derive(Clone)]
pub struct VisibilityMigrator {
    photos: Arc<dyn PhotoRepository>,
    objects: Arc<dyn ObjectStore>,
    policy: BucketPolicy,
}

impl VisibilityMigrator {
    pub fn new(
        photos: Arc<dyn PhotoRepository>,
        objects: Arc<dyn ObjectStore>,
        policy: BucketPolicy,
    ) -> Self {
        Self {
            photos,
            objects,
            policy,
        }
    }

    pub async fn change_visibility(
        &self,
        photo_id: &str,
        requested_is_public: bool,
        caller: &OwnerRef,
    ) -> ServiceResult<VisibilityChange> {
        let photo = self.owned_photo(photo_id, caller).await?;

        if photo.is_public == requested_is_public {
            debug!("photo {} already has is_public={}", photo.id, photo.is_public);
            return Ok(VisibilityChange::Unchanged);
        }

        let entry = MigrationEntry {
            photo_id: photo.id.clone(),
            source_bucket: self.policy.bucket_for_photo(&photo),
            destination_bucket: self.policy.bucket_for(&photo.owner_ref, requested_is_public),
            target_is_public: requested_is_public,
            expected_version: photo.version,
            started_at: Utc::now(),
        };
        let photo = self.lock(&entry).await?;

        info!(
            "moving photo {} from {} to {}",
            photo.id, entry.source_bucket, entry.destination_bucket
        );
        self.migrate(&photo, &entry).await
    }

    /// Remove a photo: bytes first, then the record, under the same per-photo
    /// lock as visibility changes. A missing object counts as removed; any
    /// other storage failure keeps the record so the caller can retry.
    pub async fn delete(&self, photo_id: &str, caller: &OwnerRef) -> ServiceResult<()> {
        let photo = self.owned_photo(photo_id, caller).await?;
        let bucket = self.policy.bucket_for_photo(&photo);
        let entry = MigrationEntry {
            photo_id: photo.id.clone(),
            source_bucket: bucket.clone(),
            destination_bucket: bucket.clone(),
            target_is_public: photo.is_public,
            expected_version: photo.version,
            started_at: Utc::now(),
        };
        self.lock(&entry).await?;

        if let Err(err) = self.remove_if_present(&bucket, &photo.id).await {
            self.clear_journal(&photo.id).await;
            return Err(err);
        }
        if let Err(err) = self.photos.delete(&photo.id).await {
            // Bytes are gone; the journal row lets reconcile finish the job.
            error!("photo {} bytes removed but record delete failed: {}", photo.id, err);
            return Err(err.into());
        }
        self.clear_journal(&photo.id).await;
        info!("photo {} deleted", photo.id);
        Ok(())
    }

    async fn owned_photo(&self, photo_id: &str, caller: &OwnerRef) -> ServiceResult<Photo> {
        let photo = self
            .photos
            .get(photo_id)
            .await?
            .ok_or(ServiceError::NotFound("photo"))?;
        if photo.owner_ref != *caller {
            return Err(ServiceError::Forbidden);
        }
        Ok(photo)
    }

    /// Journal `entry`, then re-read the record under the lock. Anything that
    /// committed between the first read and the lock is a conflict.
    async fn lock(&self, entry: &MigrationEntry) -> ServiceResult<Photo> {
        match self.photos.begin_migration(entry).await {
            Ok(()) => {}
            Err(RepoError::Duplicate(_)) => {
                return Err(ServiceError::Conflict(
                    "another change to this photo is already in progress".into(),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        match self.photos.get(&entry.photo_id).await {
            Ok(Some(photo)) if photo.version == entry.expected_version => Ok(photo),
            Ok(Some(_)) => {
                self.clear_journal(&entry.photo_id).await;
                Err(ServiceError::Conflict("photo was modified concurrently".into()))
            }
            Ok(None) => {
                self.clear_journal(&entry.photo_id).await;
                Err(ServiceError::NotFound("photo"))
            }
            Err(err) => {
                self.clear_journal(&entry.photo_id).await;
                Err(err.into())
            }
        }
    }

    async fn migrate(&self, photo: &Photo, entry: &MigrationEntry) -> ServiceResult<VisibilityChange> {
        if let Err(err) = self
            .objects
            .copy(&entry.source_bucket, &entry.destination_bucket, &photo.id)
            .await
        {
            warn!("copy of photo {} failed, record left unchanged: {}", photo.id, err);
            // The copy lands via rename, so nothing partial is in the destination.
            self.clear_journal(&photo.id).await;
            return Err(err.into());
        }

        let stale_bucket = match self.objects.delete(&entry.source_bucket, &photo.id).await {
            Ok(()) | Err(ObjectStoreError::ObjectNotFound { .. }) => None,
            Err(err) => {
                warn!(
                    "photo {} copied but stale copy in {} could not be removed: {}",
                    photo.id, entry.source_bucket, err
                );
                Some(entry.source_bucket.clone())
            }
        };

        let mut committed = photo.clone();
        committed.is_public = entry.target_is_public;
        if let Err(err) = self.photos.update(&committed).await {
            error!(
                "commit of photo {} visibility failed after moving bytes: {}",
                photo.id, err
            );
            match self.roll_back(entry).await {
                Ok(()) => debug!("photo {} rolled back", photo.id),
                Err(rollback_err) => error!(
                    "photo {} left journaled for reconciliation: {}",
                    photo.id, rollback_err
                ),
            }
            return Err(match err {
                RepoError::VersionConflict(_) => {
                    ServiceError::Conflict("photo was modified concurrently".into())
                }
                other => other.into(),
            });
        }

        if let Some(bucket) = &stale_bucket {
            if let Err(err) = self.photos.record_stale_copy(&photo.id, bucket).await {
                error!(
                    "stale copy of photo {} in {} not recorded: {}",
                    photo.id, bucket, err
                );
            }
        }
        self.clear_journal(&photo.id).await;
        Ok(match stale_bucket {
            Some(stale_bucket) => VisibilityChange::MigratedWithStaleCopy { stale_bucket },
            None => VisibilityChange::Migrated,
        })
    }

    /// Settle every journaled entry, then purge recorded stale copies.
    /// Intended to run once at startup, before requests are served. Returns
    /// how many journal entries were settled; failures stay journaled.
    pub async fn reconcile_pending(&self) -> ServiceResult<usize> {
        let pending = self.photos.pending_migrations().await?;
        if !pending.is_empty() {
            info!("reconciling {} interrupted photo changes", pending.len());
        }

        let mut settled = 0;
        for entry in pending {
            match self.settle(&entry).await {
                Ok(settlement) => {
                    info!("photo {} settled as {:?}", entry.photo_id, settlement);
                    settled += 1;
                }
                Err(err) => error!(
                    "could not settle pending change of photo {}: {}",
                    entry.photo_id, err
                ),
            }
        }

        self.purge_stale_copies().await?;
        Ok(settled)
    }

    /// Remove recorded stale copies, except where the bucket has since become
    /// the photo's home again.
    async fn purge_stale_copies(&self) -> ServiceResult<usize> {
        let mut purged = 0;
        for copy in self.photos.stale_copies().await? {
            let authoritative = match self.photos.get(&copy.photo_id).await? {
                Some(photo) => self.policy.bucket_for_photo(&photo) == copy.bucket,
                None => false,
            };
            if !authoritative {
                if let Err(err) = self.remove_if_present(&copy.bucket, &copy.photo_id).await {
                    warn!(
                        "stale copy of photo {} in {} still present: {}",
                        copy.photo_id, copy.bucket, err
                    );
                    continue;
                }
                purged += 1;
            }
            self.photos
                .forget_stale_copy(&copy.photo_id, &copy.bucket)
                .await?;
        }
        if purged > 0 {
            info!("purged {} stale photo copies", purged);
        }
        Ok(purged)
    }

    /// Finish interrupted work and drop its journal entry. The request that
    /// started it never got an answer, so the requested change wins.
    async fn settle(&self, entry: &MigrationEntry) -> ServiceResult<Settlement> {
        let key = entry.photo_id.as_str();
        let settlement = match self.photos.get(key).await? {
            None => {
                self.remove_everywhere(entry).await?;
                Settlement::Discarded
            }
            Some(_) if entry.is_deletion() => {
                self.remove_if_present(&entry.source_bucket, key).await?;
                self.photos.delete(key).await?;
                Settlement::Discarded
            }
            Some(photo) if photo.is_public == entry.target_is_public => {
                self.remove_if_present(&entry.source_bucket, key).await?;
                Settlement::AlreadyCommitted
            }
            Some(photo) => {
                if self.objects.exists(&entry.source_bucket, key).await? {
                    self.objects
                        .copy(&entry.source_bucket, &entry.destination_bucket, key)
                        .await?;
                    self.remove_if_present(&entry.source_bucket, key).await?;
                } else if !self.objects.exists(&entry.destination_bucket, key).await? {
                    return Err(ServiceError::NotFound("photo bytes"));
                }
                let mut committed = photo;
                committed.is_public = entry.target_is_public;
                self.photos.update(&committed).await?;
                Settlement::CompletedForward
            }
        };
        self.photos.finish_migration(key).await?;
        Ok(settlement)
    }

    /// Undo a move whose commit failed. If the record still exists the bytes go
    /// back to the source bucket only; if it is gone, no copy may survive.
    async fn roll_back(&self, entry: &MigrationEntry) -> ServiceResult<()> {
        let key = entry.photo_id.as_str();
        if self.photos.get(key).await?.is_none() {
            self.remove_everywhere(entry).await?;
        } else {
            if !self.objects.exists(&entry.source_bucket, key).await? {
                self.objects
                    .copy(&entry.destination_bucket, &entry.source_bucket, key)
                    .await?;
            }
            self.remove_if_present(&entry.destination_bucket, key).await?;
        }
        self.photos.finish_migration(key).await?;
        Ok(())
    }

    async fn remove_everywhere(&self, entry: &MigrationEntry) -> ServiceResult<()> {
        self.remove_if_present(&entry.source_bucket, &entry.photo_id).await?;
        self.remove_if_present(&entry.destination_bucket, &entry.photo_id)
            .await
    }

    async fn remove_if_present(&self, bucket: &str, key: &str) -> ServiceResult<()> {
        match self.objects.delete(bucket, key).await {
            Ok(()) | Err(ObjectStoreError::ObjectNotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// A journal row that outlives its work only blocks later changes of the
    /// same photo until the next reconcile, so failure here is logged.
    async fn clear_journal(&self, photo_id: &str) {
        if let Err(err) = self.photos.finish_migration(photo_id).await {
            error!("failed to clear journal for photo {}: {}", photo_id, err);
        }
    }
}
