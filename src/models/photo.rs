//! Represents an uploaded photo and the views of it handed to clients.

use super::user::OwnerRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for one uploaded photo. The bytes live in an object store under
/// `id`, in the bucket picked by `BucketPolicy`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Photo {
    /// Globally unique id, doubling as the object key.
    pub id: String,

    /// Owner of the photo.
    pub owner_ref: OwnerRef,

    /// Whether the photo is visible to everyone.
    pub is_public: bool,

    /// Bumped on every committed visibility change; used for compare-and-swap.
    pub version: i64,

    /// Upload timestamp.
    pub created_at: DateTime<Utc>,
}

/// One entry of the public feed or an owner's gallery.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    #[serde(rename = "PhotoID")]
    pub id: String,
    #[serde(rename = "ImageURL")]
    pub image_url: String,
}

/// Photo details as seen by a particular caller.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PhotoDetails {
    #[serde(rename = "PhotoID")]
    pub id: String,
    #[serde(rename = "IsPublic")]
    pub is_public: bool,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "IsOwnedByAPIUser")]
    pub is_owned_by_caller: bool,
    #[serde(rename = "ImageURL")]
    pub image_url: String,
}
