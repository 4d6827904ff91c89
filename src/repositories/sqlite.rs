//! SQLite-backed record stores.

use super::{PhotoRepository, RepoError, RepoResult, UserRepository};
use crate::models::{
    migration::{MigrationEntry, StaleCopy},
    photo::Photo,
    user::{OwnerRef, User},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

const PHOTO_COLUMNS: &str = "id, owner_ref, is_public, version, created_at";

#[derive(Clone)]
pub struct SqliteUserRepository {
    db: Arc<SqlitePool>,
}

impl SqliteUserRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> RepoResult<()> {
        match sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Duplicate("username")),
            Err(err) => Err(RepoError::Sqlx(err)),
        }
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_all(&*self.db)
        .await?;
        Ok(users)
    }

    async fn find_by_owner_ref(&self, owner_ref: &OwnerRef) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(owner_ref)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct SqlitePhotoRepository {
    db: Arc<SqlitePool>,
}

impl SqlitePhotoRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    async fn create(&self, photo: &Photo) -> RepoResult<()> {
        match sqlx::query(
            "INSERT INTO photos (id, owner_ref, is_public, version, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&photo.id)
        .bind(photo.owner_ref)
        .bind(photo.is_public)
        .bind(photo.version)
        .bind(photo.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Duplicate("photo")),
            Err(err) => Err(RepoError::Sqlx(err)),
        }
    }

    async fn get(&self, id: &str) -> RepoResult<Option<Photo>> {
        let photo =
            sqlx::query_as::<_, Photo>(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"))
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
        Ok(photo)
    }

    async fn find_by_owner(&self, owner_ref: &OwnerRef) -> RepoResult<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE owner_ref = ? ORDER BY created_at, id"
        ))
        .bind(owner_ref)
        .fetch_all(&*self.db)
        .await?;
        Ok(photos)
    }

    async fn find_public(&self) -> RepoResult<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE is_public = 1 ORDER BY created_at, id"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(photos)
    }

    async fn update(&self, photo: &Photo) -> RepoResult<Photo> {
        let updated = sqlx::query_as::<_, Photo>(&format!(
            "UPDATE photos SET is_public = ?, version = version + 1
             WHERE id = ? AND version = ?
             RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(photo.is_public)
        .bind(&photo.id)
        .bind(photo.version)
        .fetch_optional(&*self.db)
        .await?;
        updated.ok_or_else(|| RepoError::VersionConflict(photo.id.clone()))
    }

    async fn delete(&self, id: &str) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_migration(&self, entry: &MigrationEntry) -> RepoResult<()> {
        match sqlx::query(
            "INSERT INTO visibility_migrations (
                photo_id, source_bucket, destination_bucket,
                target_is_public, expected_version, started_at
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.photo_id)
        .bind(&entry.source_bucket)
        .bind(&entry.destination_bucket)
        .bind(entry.target_is_public)
        .bind(entry.expected_version)
        .bind(entry.started_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Duplicate("migration")),
            Err(err) => Err(RepoError::Sqlx(err)),
        }
    }

    async fn finish_migration(&self, photo_id: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM visibility_migrations WHERE photo_id = ?")
            .bind(photo_id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn pending_migrations(&self) -> RepoResult<Vec<MigrationEntry>> {
        let entries = sqlx::query_as::<_, MigrationEntry>(
            "SELECT photo_id, source_bucket, destination_bucket,
                    target_is_public, expected_version, started_at
             FROM visibility_migrations ORDER BY started_at",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(entries)
    }

    async fn record_stale_copy(&self, photo_id: &str, bucket: &str) -> RepoResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO stale_copies (photo_id, bucket, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(photo_id)
        .bind(bucket)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn stale_copies(&self) -> RepoResult<Vec<StaleCopy>> {
        let copies = sqlx::query_as::<_, StaleCopy>(
            "SELECT photo_id, bucket, recorded_at FROM stale_copies ORDER BY recorded_at",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(copies)
    }

    async fn forget_stale_copy(&self, photo_id: &str, bucket: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM stale_copies WHERE photo_id = ? AND bucket = ?")
            .bind(photo_id)
            .bind(bucket)
            .execute(&*self.db)
            .await?;
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
