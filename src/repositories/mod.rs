//! Record stores for users and photos.
//!
//! The services depend on these traits only; the SQLite implementations live
//! in `sqlite`.

pub mod sqlite;

use crate::models::{
    migration::{MigrationEntry, StaleCopy},
    photo::Photo,
    user::{OwnerRef, User},
};
use async_trait::async_trait;
use thiserror::Error;

pub use sqlite::{SqlitePhotoRepository, SqliteUserRepository};

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint rejected the write (username taken, photo already
    /// migrating, ...).
    #[error("{0} already exists")]
    Duplicate(&'static str),
    /// Compare-and-swap lost: the row changed since it was read.
    #[error("record `{0}` was modified concurrently")]
    VersionConflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account. Fails with `Duplicate` if the username is taken.
    async fn create(&self, user: &User) -> RepoResult<()>;

    /// Every account registered under `username`. More than one entry is a
    /// data-integrity violation the caller must surface.
    async fn find_by_username(&self, username: &str) -> RepoResult<Vec<User>>;

    async fn find_by_owner_ref(&self, owner_ref: &OwnerRef) -> RepoResult<Option<User>>;
}

#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn create(&self, photo: &Photo) -> RepoResult<()>;

    async fn get(&self, id: &str) -> RepoResult<Option<Photo>>;

    async fn find_by_owner(&self, owner_ref: &OwnerRef) -> RepoResult<Vec<Photo>>;

    async fn find_public(&self) -> RepoResult<Vec<Photo>>;

    /// Persist `photo.is_public` if the stored version still equals
    /// `photo.version`, bumping the version. Returns the stored record.
    async fn update(&self, photo: &Photo) -> RepoResult<Photo>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> RepoResult<bool>;

    /// Journal a migration. Fails with `Duplicate` while another migration of
    /// the same photo is in flight.
    async fn begin_migration(&self, entry: &MigrationEntry) -> RepoResult<()>;

    async fn finish_migration(&self, photo_id: &str) -> RepoResult<()>;

    async fn pending_migrations(&self) -> RepoResult<Vec<MigrationEntry>>;

    /// Remember a copy that could not be removed from `bucket`. Recording the
    /// same copy twice is a no-op.
    async fn record_stale_copy(&self, photo_id: &str, bucket: &str) -> RepoResult<()>;

    async fn stale_copies(&self) -> RepoResult<Vec<StaleCopy>>;

    async fn forget_stale_copy(&self, photo_id: &str, bucket: &str) -> RepoResult<()>;
}
