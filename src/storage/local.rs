//! src/storage/local.rs
//!
//! LocalObjectStore: filesystem-backed `ObjectStore`. Buckets are directories
//! beneath `base_path`, and objects are sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. No metadata database is
//! involved; the photo records live elsewhere.

use super::{
    AccessMethod, ByteStream, ObjectInfo, ObjectStore, ObjectStoreError, ObjectStoreResult,
    signing::{SignatureError, UrlSigner},
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Objects on local disk, with HMAC-signed download URLs served by
/// `handlers::object_handlers::get_signed_object`.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where bucket directories live.
    base_path: PathBuf,

    /// Prefix of every signed URL, e.g. `http://127.0.0.1:8080`.
    public_base_url: String,

    signer: UrlSigner,
}

impl LocalObjectStore {
    /// Create a store rooted at `base_path` whose signed URLs start with
    /// `public_base_url` and are signed with `signing_secret`.
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signer: UrlSigner::new(signing_secret),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/` or contain `..`, control characters or
    /// backslashes.
    fn ensure_key_safe(&self, key: &str) -> ObjectStoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    ///
    /// Bucket names become directory names, so this also keeps them from
    /// escaping `base_path`.
    fn ensure_bucket_name_safe(&self, name: &str) -> ObjectStoreResult<()> {
        let invalid = |reason: &str| ObjectStoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn ensure_location_safe(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Combines base_path/bucket/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn ensure_parent(path: &Path) -> ObjectStoreResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent)
    }

    /// Move a fully written temp file over `final_path`, replacing any
    /// previous object.
    async fn commit_tmp(tmp_path: &Path, final_path: &Path) -> ObjectStoreResult<()> {
        if let Err(err) = fs::rename(tmp_path, final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(final_path).await?;
                fs::rename(tmp_path, final_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> ObjectStoreError {
        ObjectStoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Open an object for streaming out, returning its size alongside the handle.
    pub async fn open_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<(File, u64)> {
        self.ensure_location_safe(bucket, key)?;
        let file_path = self.object_path(bucket, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Self::not_found(bucket, key)
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Check a `GET` signature produced by `signed_url`.
    pub fn verify_signed_get(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), SignatureError> {
        self.signer.verify(
            AccessMethod::Get,
            bucket,
            key,
            expires,
            signature,
            Utc::now().timestamp(),
        )
    }

    /// Recursively remove empty directories up to bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    /// Stream the body into a temp file next to its final location, computing
    /// MD5/etag and size as it goes, fsync, then rename into place.
    ///
    /// Temp files are removed on every error path, so a failed upload never
    /// becomes visible under `key`.
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream<'_>,
    ) -> ObjectStoreResult<ObjectInfo> {
        self.ensure_location_safe(bucket, key)?;

        let file_path = self.object_path(bucket, key);
        let parent = Self::ensure_parent(&file_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ObjectStoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        drop(file);

        Self::commit_tmp(&tmp_path, &file_path).await?;
        debug!("wrote {} bytes to {}/{}", size_bytes, bucket, key);

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size_bytes,
            etag: format!("{:x}", digest.compute()),
        })
    }

    async fn copy(&self, src_bucket: &str, dst_bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.ensure_location_safe(src_bucket, key)?;
        self.ensure_bucket_name_safe(dst_bucket)?;

        let src_path = self.object_path(src_bucket, key);
        if !fs::try_exists(&src_path).await? {
            return Err(Self::not_found(src_bucket, key));
        }
        if src_bucket == dst_bucket {
            return Ok(());
        }

        let dst_path = self.object_path(dst_bucket, key);
        let parent = Self::ensure_parent(&dst_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = fs::copy(&src_path, &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(if err.kind() == ErrorKind::NotFound {
                Self::not_found(src_bucket, key)
            } else {
                ObjectStoreError::Io(err)
            });
        }
        let synced: io::Result<()> = async { File::open(&tmp_path).await?.sync_all().await }.await;
        if let Err(err) = synced {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        Self::commit_tmp(&tmp_path, &dst_path).await?;
        debug!("copied {}/{} to {}/{}", src_bucket, key, dst_bucket, key);
        Ok(())
    }

    /// Remove the payload and prune now-empty shard directories.
    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.ensure_location_safe(bucket, key)?;

        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Self::not_found(bucket, key));
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool> {
        self.ensure_location_safe(bucket, key)?;
        Ok(fs::try_exists(self.object_path(bucket, key)).await?)
    }

    fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        method: AccessMethod,
    ) -> ObjectStoreResult<String> {
        self.ensure_location_safe(bucket, key)?;
        let ttl_secs =
            i64::try_from(ttl.as_secs()).map_err(|e| ObjectStoreError::Signing(e.to_string()))?;
        let expires = Utc::now().timestamp() + ttl_secs;
        let signature = self
            .signer
            .sign(method, bucket, key, expires)
            .map_err(|e| ObjectStoreError::Signing(e.to_string()))?;
        Ok(format!(
            "{}/objects/{}/{}?expires={}&signature={}",
            self.public_base_url, bucket, key, expires, signature
        ))
    }

    /// Best-effort write/read/delete of a temp file under `base_path`.
    async fn check_ready(&self) -> ObjectStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}
