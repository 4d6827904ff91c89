//! Account registration and session issuance.

use super::{
    error::{OwnershipError, ServiceError, ServiceResult},
    ownership::OwnershipResolver,
};
use crate::{
    auth::{
        password::CredentialHasher,
        token::{Claims, SESSION_TTL, SessionToken, TokenCodec},
    },
    models::user::{OwnerRef, User},
    repositories::{RepoError, UserRepository},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Plaintext behind the digest verified for unknown usernames, so a failed
/// login costs one hash verification whether or not the account exists.
const DECOY_PASSWORD: &str = "photo-store decoy credential";

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<TokenCodec>,
    owners: OwnershipResolver,
    decoy_digest: Arc<OnceCell<String>>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<TokenCodec>,
    ) -> Self {
        Self {
            owners: OwnershipResolver::new(users.clone()),
            users,
            hasher,
            tokens,
            decoy_digest: Arc::new(OnceCell::new()),
        }
    }

    pub fn owners(&self) -> &OwnershipResolver {
        &self.owners
    }

    pub async fn signup(&self, username: &str, password: &str) -> ServiceResult<OwnerRef> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::Malformed(
                "username and password are required".into(),
            ));
        }

        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await??;

        let user = User {
            id: OwnerRef::generate(),
            username: username.to_string(),
            password_hash,
            created_at: Utc::now(),
        };
        match self.users.create(&user).await {
            Ok(()) => {
                info!("account `{}` created", user.username);
                Ok(user.id)
            }
            Err(RepoError::Duplicate(_)) => Err(ServiceError::Conflict(format!(
                "username `{}` is taken",
                user.username
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Verify credentials and issue a session. Unknown usernames and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<SessionToken> {
        let username = username.trim();
        let mut matches = self.users.find_by_username(username).await?;
        let user = match matches.len() {
            0 => {
                let digest = self.decoy_digest().await?;
                self.verify(password, digest).await?;
                warn!("login attempt for unknown account `{}`", username);
                return Err(ServiceError::Unauthorized);
            }
            1 => matches.remove(0),
            count => {
                return Err(OwnershipError::Ambiguous {
                    subject: username.to_string(),
                    count,
                }
                .into());
            }
        };

        if !self.verify(password, &user.password_hash).await? {
            warn!("wrong password for account `{}`", username);
            return Err(ServiceError::Unauthorized);
        }

        let session = self.tokens.issue(&user.username, SESSION_TTL)?;
        info!("session issued for `{}`", user.username);
        Ok(session)
    }

    pub fn refresh(&self, claims: &Claims) -> ServiceResult<SessionToken> {
        Ok(self.tokens.refresh(claims)?)
    }

    async fn verify(&self, password: &str, digest: &str) -> ServiceResult<bool> {
        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let digest = digest.to_string();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest)).await?)
    }

    async fn decoy_digest(&self) -> ServiceResult<&str> {
        let digest = self
            .decoy_digest
            .get_or_try_init(|| async {
                let hasher = self.hasher.clone();
                let digest =
                    tokio::task::spawn_blocking(move || hasher.hash(DECOY_PASSWORD)).await??;
                Ok::<_, ServiceError>(digest)
            })
            .await?;
        Ok(digest.as_str())
    }
}
