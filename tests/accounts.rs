use photo_store::{
    auth::{CredentialHasher, TokenCodec, password::HashError},
    db,
    repositories::SqliteUserRepository,
    services::{AccountService, ServiceError},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Reversible stand-in for Argon2 that counts verifications.
#[derive(Default)]
struct CountingHasher {
    verifications: AtomicUsize,
}

impl CredentialHasher for CountingHasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        Ok(format!("plain:{plaintext}"))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        digest == format!("plain:{plaintext}")
    }
}

async fn accounts() -> (AccountService, Arc<CountingHasher>) {
    let pool = Arc::new(db::connect_in_memory().await.unwrap());
    let hasher = Arc::new(CountingHasher::default());
    let service = AccountService::new(
        Arc::new(SqliteUserRepository::new(pool)),
        hasher.clone(),
        Arc::new(TokenCodec::new(b"accounts-test-secret")),
    );
    (service, hasher)
}

#[tokio::test]
async fn login_trims_the_username_like_signup() {
    let (accounts, _) = accounts().await;
    accounts.signup("  alice ", "password").await.unwrap();

    let padded = accounts.authenticate("alice  ", "password").await.unwrap();
    assert_eq!(padded.claims.sub, "alice");
    let exact = accounts.authenticate("alice", "password").await.unwrap();
    assert_eq!(exact.claims.sub, "alice");
}

#[tokio::test]
async fn unknown_username_costs_a_verification() {
    let (accounts, hasher) = accounts().await;
    accounts.signup("alice", "password").await.unwrap();

    let wrong_password = accounts.authenticate("alice", "nope").await;
    assert!(matches!(wrong_password, Err(ServiceError::Unauthorized)));
    assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);

    for _ in 0..2 {
        let unknown = accounts.authenticate("mallory", "nope").await;
        assert!(matches!(unknown, Err(ServiceError::Unauthorized)));
    }
    assert_eq!(hasher.verifications.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn blank_signup_is_malformed() {
    let (accounts, _) = accounts().await;
    assert!(matches!(
        accounts.signup("   ", "password").await,
        Err(ServiceError::Malformed(_))
    ));
}
