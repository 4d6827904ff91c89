//! Represents a registered account and its stable owner reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Stable, never-reused identifier for an account.
///
/// Storage is partitioned by this value, never by the username.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct OwnerRef(pub Uuid);

impl OwnerRef {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account.
#[derive(Clone, FromRow, Debug)]
pub struct User {
    /// Owner reference, assigned at signup and immutable afterwards.
    pub id: OwnerRef,

    /// Login name; also the token subject.
    pub username: String,

    /// PHC-formatted password digest.
    pub password_hash: String,

    /// When this account was created.
    pub created_at: DateTime<Utc>,
}
