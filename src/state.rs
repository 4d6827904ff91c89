//! Shared application state handed to every handler.

use crate::{
    auth::{Argon2Hasher, CredentialHasher, TokenCodec},
    repositories::{PhotoRepository, SqlitePhotoRepository, SqliteUserRepository, UserRepository},
    services::{AccountService, PhotoService},
    storage::{BucketPolicy, LocalObjectStore, ObjectStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub tokens: Arc<TokenCodec>,
    pub accounts: AccountService,
    pub photos: PhotoService,
    /// Concrete store, needed by the signed download route.
    pub objects: Arc<LocalObjectStore>,
}

impl AppState {
    /// Wire the SQLite repositories, Argon2 hashing and the local object store
    /// into the services.
    pub fn new(
        db: Arc<SqlitePool>,
        objects: Arc<LocalObjectStore>,
        tokens: Arc<TokenCodec>,
        policy: BucketPolicy,
    ) -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db.clone()));
        let photos: Arc<dyn PhotoRepository> = Arc::new(SqlitePhotoRepository::new(db.clone()));
        let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::new());
        let store: Arc<dyn ObjectStore> = objects.clone();

        Self {
            accounts: AccountService::new(users.clone(), hasher, tokens.clone()),
            photos: PhotoService::new(photos, users, store, policy),
            db,
            tokens,
            objects,
        }
    }
}
