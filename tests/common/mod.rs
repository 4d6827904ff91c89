#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use photo_store::{
    db,
    models::user::{OwnerRef, User},
    repositories::{
        PhotoRepository, SqlitePhotoRepository, SqliteUserRepository, UserRepository,
    },
    services::PhotoService,
    storage::{
        AccessMethod, BucketPolicy, ByteStream, LocalObjectStore, ObjectInfo, ObjectStore,
        ObjectStoreError, ObjectStoreResult,
    },
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use sqlx::SqlitePool;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SIGNING_SECRET: &str = "integration-signing-secret";
pub const BASE_URL: &str = "http://photos.test";

/// `ObjectStore` wrapper that counts mutating calls and fails them on demand.
/// With `pause_copy` set, the next copy completes and then waits for
/// `copy_release`, announcing itself on `copy_done` first.
pub struct FlakyStore {
    inner: Arc<dyn ObjectStore>,
    pub fail_write: AtomicBool,
    pub fail_copy: AtomicBool,
    pub fail_delete: AtomicBool,
    pub pause_copy: AtomicBool,
    pub copy_done: Notify,
    pub copy_release: Notify,
    mutations: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_write: AtomicBool::new(false),
            fail_copy: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            pause_copy: AtomicBool::new(false),
            copy_done: Notify::new(),
            copy_release: Notify::new(),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Writes, copies and deletes seen so far, failed ones included.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn injected(flag: &AtomicBool) -> ObjectStoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Io(io::Error::other("injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream<'_>,
    ) -> ObjectStoreResult<ObjectInfo> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_write)?;
        self.inner.write(bucket, key, body).await
    }

    async fn copy(&self, src_bucket: &str, dst_bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_copy)?;
        self.inner.copy(src_bucket, dst_bucket, key).await?;
        if self.pause_copy.swap(false, Ordering::SeqCst) {
            self.copy_done.notify_one();
            self.copy_release.notified().await;
        }
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_delete)?;
        self.inner.delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool> {
        self.inner.exists(bucket, key).await
    }

    fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        method: AccessMethod,
    ) -> ObjectStoreResult<String> {
        self.inner.signed_url(bucket, key, ttl, method)
    }

    async fn check_ready(&self) -> ObjectStoreResult<()> {
        self.inner.check_ready().await
    }
}

/// Services over an in-memory database and a temp-dir store wrapped in
/// `FlakyStore`.
pub struct Harness {
    pub dir: TempDir,
    pub db: Arc<SqlitePool>,
    pub users: Arc<dyn UserRepository>,
    pub records: Arc<dyn PhotoRepository>,
    pub local: Arc<LocalObjectStore>,
    pub store: Arc<FlakyStore>,
    pub policy: BucketPolicy,
    pub photos: PhotoService,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(db::connect_in_memory().await.unwrap());
        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db.clone()));
        let records: Arc<dyn PhotoRepository> = Arc::new(SqlitePhotoRepository::new(db.clone()));
        let local = Arc::new(LocalObjectStore::new(dir.path(), BASE_URL, SIGNING_SECRET));
        let store = Arc::new(FlakyStore::new(local.clone()));
        let policy = BucketPolicy::default();
        let photos = PhotoService::new(records.clone(), users.clone(), store.clone(), policy.clone());

        Self {
            dir,
            db,
            users,
            records,
            local,
            store,
            policy,
            photos,
        }
    }

    /// Register an account directly, skipping password hashing.
    pub async fn user(&self, username: &str) -> OwnerRef {
        let user = User {
            id: OwnerRef::generate(),
            username: username.into(),
            password_hash: "not-a-real-digest".into(),
            created_at: Utc::now(),
        };
        self.users.create(&user).await.unwrap();
        user.id
    }

    pub async fn upload(&self, owner: &OwnerRef, data: &'static [u8], is_public: bool) -> String {
        self.photos
            .upload(owner, bytes_body(data), is_public)
            .await
            .unwrap()
    }

    /// Buckets currently holding `photo_id`, out of the owner's private bucket
    /// and the public one.
    pub async fn holders(&self, owner: &OwnerRef, photo_id: &str) -> Vec<String> {
        let mut holders = Vec::new();
        for is_public in [false, true] {
            let bucket = self.policy.bucket_for(owner, is_public);
            if self.local.exists(&bucket, photo_id).await.unwrap() {
                holders.push(bucket);
            }
        }
        holders
    }
}

pub fn bytes_body(data: &'static [u8]) -> ByteStream<'static> {
    stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
}
