//! Error taxonomy shared by the services.

use crate::{
    auth::{password::HashError, token::TokenError},
    repositories::RepoError,
    storage::ObjectStoreError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("no account for subject `{0}`")]
    NotFound(String),
    /// More than one account maps to the subject. Data-integrity violation.
    #[error("{count} accounts map to subject `{subject}`")]
    Ambiguous { subject: String, count: usize },
    #[error(transparent)]
    Repository(#[from] RepoError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Client sent unparsable or incomplete input.
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("authentication required")]
    Unauthorized,
    /// Authenticated but not entitled. Also returned for resources the caller
    /// must not learn exist.
    #[error("not permitted")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
    #[error(transparent)]
    Storage(#[from] ObjectStoreError),
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error(transparent)]
    Hashing(#[from] HashError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
