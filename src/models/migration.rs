//! Journal entry for an in-flight visibility migration.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Written before bytes move between buckets and removed once the record is
/// committed. A leftover row means the process stopped mid-migration.
#[derive(Clone, FromRow, Debug, PartialEq, Eq)]
pub struct MigrationEntry {
    /// Photo being moved. Primary key, so at most one migration per photo.
    pub photo_id: String,

    /// Bucket the bytes are leaving.
    pub source_bucket: String,

    /// Bucket the bytes are moving to.
    pub destination_bucket: String,

    /// Visibility the record will have once committed.
    pub target_is_public: bool,

    /// Record version observed when the migration started.
    pub expected_version: i64,

    /// When the migration was journaled.
    pub started_at: DateTime<Utc>,
}

impl MigrationEntry {
    /// A delete holds the same per-photo lock as a move, journaled with
    /// identical source and destination buckets.
    pub fn is_deletion(&self) -> bool {
        self.source_bucket == self.destination_bucket
    }
}

/// Copy left behind in a bucket that no longer owns the photo, awaiting
/// removal by the next reconcile pass.
#[derive(Clone, FromRow, Debug, PartialEq, Eq)]
pub struct StaleCopy {
    pub photo_id: String,
    pub bucket: String,
    pub recorded_at: DateTime<Utc>,
}
