//! Object storage capability consumed by the photo services.
//!
//! The services only ever talk to `dyn ObjectStore`; `LocalObjectStore` is the
//! filesystem-backed implementation shipped with the binary.

pub mod local;
pub mod placement;
pub mod signing;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, time::Duration};
use thiserror::Error;

pub use local::LocalObjectStore;
pub use placement::BucketPolicy;

/// Streamed object body.
pub type ByteStream<'a> = BoxStream<'a, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("signed url could not be produced: {0}")]
    Signing(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// HTTP method a signed URL is scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMethod {
    Get,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Get => "GET",
        }
    }
}

/// Result of a completed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub etag: String,
}

/// Bucket/object primitives. Buckets spring into existence on first write.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `bucket/key`. The object only becomes visible once the
    /// whole stream has been durably written; a failed write leaves nothing behind.
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream<'_>,
    ) -> ObjectStoreResult<ObjectInfo>;

    /// Copy `key` from `src_bucket` into `dst_bucket`, overwriting any existing
    /// object there. Running the same copy twice is harmless.
    async fn copy(&self, src_bucket: &str, dst_bucket: &str, key: &str) -> ObjectStoreResult<()>;

    /// Remove `bucket/key`. Returns `ObjectNotFound` if nothing was there.
    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()>;

    async fn exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool>;

    /// Mint a URL granting `method` on `bucket/key` for `ttl`.
    fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        method: AccessMethod,
    ) -> ObjectStoreResult<String>;

    /// Cheap round-trip against the backing store, used by readiness probes.
    async fn check_ready(&self) -> ObjectStoreResult<()>;
}
