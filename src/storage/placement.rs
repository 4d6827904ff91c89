//! Decides which bucket holds a photo's bytes.
//!
//! Every caller that needs to locate an object goes through `BucketPolicy`;
//! nothing else derives bucket names.

use crate::models::{photo::Photo, user::OwnerRef};

pub const DEFAULT_PUBLIC_BUCKET: &str = "photos-public";

const PRIVATE_BUCKET_PREFIX: &str = "owner-";

#[derive(Clone, Debug)]
pub struct BucketPolicy {
    public_bucket: String,
}

impl BucketPolicy {
    pub fn new(public_bucket: impl Into<String>) -> Self {
        Self {
            public_bucket: public_bucket.into(),
        }
    }

    pub fn public_bucket(&self) -> &str {
        &self.public_bucket
    }

    /// Public photos share one bucket; private ones live in the owner's bucket.
    pub fn bucket_for(&self, owner_ref: &OwnerRef, is_public: bool) -> String {
        if is_public {
            self.public_bucket.clone()
        } else {
            private_bucket_name(owner_ref)
        }
    }

    pub fn bucket_for_photo(&self, photo: &Photo) -> String {
        self.bucket_for(&photo.owner_ref, photo.is_public)
    }
}

impl Default for BucketPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_BUCKET)
    }
}

/// `owner-` followed by the 32 hex digits of the owner uuid: 38 characters,
/// lowercase, always a valid bucket name.
fn private_bucket_name(owner_ref: &OwnerRef) -> String {
    format!("{}{}", PRIVATE_BUCKET_PREFIX, owner_ref.0.simple())
}
